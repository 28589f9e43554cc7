//! Application configuration structures.

use crate::ProcessRole;
use lumen_core::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Which halves of the system this process runs.
    #[serde(default)]
    pub role: ProcessRole,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// JWT configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Job coordination configuration.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Upload and thumbnail locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Realtime gateway configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "lumen".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds (non-upgraded requests only).
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Use Redis for the queue, lock, store, and event bus. When disabled
    /// everything runs in-process, which only works with a single process.
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
            enabled: true,
        }
    }
}

/// Security configuration.
///
/// Must match the values the HTTP ingress signs tokens with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// JWT secret key.
    pub jwt_secret: String,
    /// JWT access token expiration in seconds.
    pub jwt_access_expiration_secs: u64,
    /// JWT issuer.
    pub jwt_issuer: String,
    /// JWT audience.
    pub jwt_audience: String,
    /// Cookie carrying the session token.
    pub token_cookie: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production-0123456789abcdef".to_string(),
            jwt_access_expiration_secs: 3600,
            jwt_issuer: "lumen".to_string(),
            jwt_audience: "lumen-api".to_string(),
            token_cookie: "token".to_string(),
        }
    }
}

impl SecurityConfig {
    /// Returns the access token expiration as a Duration.
    #[must_use]
    pub const fn access_token_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_access_expiration_secs)
    }
}

/// Job coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Prefix for every Redis key and channel.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Queue name.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Maximum concurrent jobs per process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Poll interval when the queue is empty, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Owner lock TTL in milliseconds.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    /// First requeue delay after losing the owner lock, in milliseconds.
    #[serde(default = "default_contention_delay_ms")]
    pub contention_delay_ms: u64,
    /// Growth factor applied to the delay per contended attempt.
    #[serde(default = "default_contention_multiplier")]
    pub contention_multiplier: f64,
    /// Upper bound for the requeue delay, in milliseconds.
    #[serde(default = "default_contention_max_delay_ms")]
    pub contention_max_delay_ms: u64,
    /// Contended attempts before the job is failed. `0` retries forever.
    #[serde(default = "default_max_contention_attempts")]
    pub max_contention_attempts: u32,
    /// Time after which an unacknowledged delivery is handed out again.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    /// Interval of the stale delivery sweep.
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    /// Upper bound for a single render. Kept below the lock TTL so the lock
    /// cannot expire while its holder is still rendering.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    /// Time to wait for in-flight jobs on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_key_prefix() -> String {
    "lumen".to_string()
}

fn default_queue_name() -> String {
    "thumbnail-jobs".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_lock_ttl_ms() -> u64 {
    30_000
}

fn default_contention_delay_ms() -> u64 {
    2_000
}

fn default_contention_multiplier() -> f64 {
    1.0
}

fn default_contention_max_delay_ms() -> u64 {
    30_000
}

fn default_max_contention_attempts() -> u32 {
    150
}

fn default_visibility_timeout_secs() -> u64 {
    120
}

fn default_recovery_interval_secs() -> u64 {
    15
}

fn default_render_timeout_secs() -> u64 {
    25
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            queue_name: default_queue_name(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_ttl_ms: default_lock_ttl_ms(),
            contention_delay_ms: default_contention_delay_ms(),
            contention_multiplier: default_contention_multiplier(),
            contention_max_delay_ms: default_contention_max_delay_ms(),
            max_contention_attempts: default_max_contention_attempts(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            recovery_interval_secs: default_recovery_interval_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl JobsConfig {
    /// Returns the poll interval as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the owner lock TTL as a Duration.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Returns the first contention delay as a Duration.
    #[must_use]
    pub const fn contention_delay(&self) -> Duration {
        Duration::from_millis(self.contention_delay_ms)
    }

    /// Returns the contention delay cap as a Duration.
    #[must_use]
    pub const fn contention_max_delay(&self) -> Duration {
        Duration::from_millis(self.contention_max_delay_ms)
    }

    /// Returns the visibility timeout as a Duration.
    #[must_use]
    pub const fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Returns the recovery sweep interval as a Duration.
    #[must_use]
    pub const fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    /// Returns the render timeout as a Duration.
    #[must_use]
    pub const fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Upload and thumbnail locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of uploaded originals, one sub-directory per owner. Job input
    /// references are resolved relative to it.
    pub upload_root: PathBuf,
    /// Directory thumbnails are written to, one sub-directory per owner.
    pub thumbnail_dir: PathBuf,
    /// Public URL prefix under which `thumbnail_dir` is served.
    pub public_prefix: String,
    /// Edge length of the square thumbnail, in pixels.
    pub thumbnail_size: u32,
    /// `ffmpeg` executable.
    pub ffmpeg_path: String,
    /// `ffprobe` executable.
    pub ffprobe_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("./uploads/originals"),
            thumbnail_dir: PathBuf::from("./uploads/thumbnails"),
            public_prefix: "/uploads/thumbnails".to_string(),
            thumbnail_size: 128,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Realtime gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// WebSocket upgrade path.
    pub path: String,
    /// Capacity of the in-process event bus.
    pub bus_capacity: usize,
    /// Interval between ping frames to every open session, in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            bus_capacity: 1024,
            heartbeat_interval_secs: 30,
        }
    }
}

impl RealtimeConfig {
    /// Returns the heartbeat interval as a Duration.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
    /// Enable metrics.
    pub metrics_enabled: bool,
    /// Metrics endpoint path.
    pub metrics_path: String,
    /// Tracing export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Telemetry settings with the log level and format applied.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let mut telemetry = self.telemetry.clone();
        telemetry.json_logs = self.log_format.eq_ignore_ascii_case("json");
        telemetry.log_filter = format!("{},lumen=debug,tower_http=info", self.log_level);
        telemetry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let jobs = JobsConfig::default();
        assert_eq!(jobs.concurrency, 4);
        assert_eq!(jobs.lock_ttl(), Duration::from_secs(30));
        assert_eq!(jobs.contention_delay(), Duration::from_secs(2));
        assert_eq!(jobs.max_contention_attempts, 150);
        assert_eq!(jobs.queue_name, "thumbnail-jobs");
    }

    #[test]
    fn test_server_address() {
        assert_eq!(ServerConfig::default().addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_storage_defaults() {
        let storage = StorageConfig::default();
        assert_eq!(storage.upload_root, PathBuf::from("./uploads/originals"));
        assert_eq!(storage.public_prefix, "/uploads/thumbnails");
        assert_eq!(storage.thumbnail_size, 128);
    }

    #[test]
    fn test_telemetry_config_follows_log_format() {
        let mut observability = ObservabilityConfig::default();
        observability.log_format = "json".to_string();
        observability.log_level = "warn".to_string();
        let telemetry = observability.telemetry_config();
        assert!(telemetry.json_logs);
        assert!(telemetry.log_filter.starts_with("warn"));
    }

    #[test]
    fn test_partial_jobs_section() {
        let jobs: JobsConfig = serde_json::from_str(r#"{"concurrency": 8}"#).unwrap();
        assert_eq!(jobs.concurrency, 8);
        assert_eq!(jobs.lock_ttl_ms, 30_000);
    }
}
