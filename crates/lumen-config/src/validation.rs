//! Configuration validation module.
//!
//! Checks every section up front and reports all problems at once, so a
//! misconfigured process fails at startup instead of on its first job.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// JWT secret is too short (minimum 32 characters for security).
    JwtSecretTooShort { actual: usize, minimum: usize },
    /// Port number is invalid (must be 1-65535).
    InvalidPort { name: String, value: u16 },
    /// Pool size is zero or exceeds the maximum allowed.
    InvalidPoolSize { value: u32, maximum: u32 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Sampling ratio must be between 0.0 and 1.0.
    InvalidSamplingRatio { value: f64 },
    /// Timeout or interval must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Worker concurrency must be at least 1.
    ZeroConcurrency,
    /// Contention backoff must not shrink.
    InvalidMultiplier { value: f64 },
    /// A render may outlive the owner lock.
    RenderOutlivesLock { render_ms: u64, lock_ttl_ms: u64 },
    /// A live delivery may be handed out again while its lock is held.
    VisibilityBelowLockTtl { visibility_ms: u64, lock_ttl_ms: u64 },
    /// Required text value is empty.
    EmptyValue { name: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Realtime path must be absolute and not the root.
    InvalidRealtimePath { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JwtSecretTooShort { actual, minimum } => {
                write!(f, "security.jwt_secret has {actual} characters, need at least {minimum}")
            }
            Self::InvalidPort { name, value } => write!(f, "{name}: port {value} is not usable"),
            Self::InvalidPoolSize { value, maximum } => {
                write!(f, "redis.pool_size {value} is outside 1..={maximum}")
            }
            Self::InvalidUrl { url_type, message } => write!(f, "{url_type} URL rejected: {message}"),
            Self::InvalidSamplingRatio { value } => {
                write!(f, "telemetry sampling ratio {value} is outside 0.0..=1.0")
            }
            Self::NonPositiveTimeout { name, value } => write!(f, "{name} must be > 0, got {value}"),
            Self::ZeroConcurrency => write!(f, "jobs.concurrency must be at least 1"),
            Self::InvalidMultiplier { value } => {
                write!(f, "jobs.contention_multiplier must be >= 1.0, got {value}")
            }
            Self::RenderOutlivesLock { render_ms, lock_ttl_ms } => write!(
                f,
                "jobs.render_timeout ({render_ms} ms) must be shorter than jobs.lock_ttl ({lock_ttl_ms} ms)"
            ),
            Self::VisibilityBelowLockTtl { visibility_ms, lock_ttl_ms } => write!(
                f,
                "jobs.visibility_timeout ({visibility_ms} ms) must exceed jobs.lock_ttl ({lock_ttl_ms} ms)"
            ),
            Self::EmptyValue { name } => write!(f, "{name} must not be empty"),
            Self::InvalidLogLevel { value } => {
                write!(f, "observability.log_level '{value}' is not one of {LOG_LEVELS:?}")
            }
            Self::InvalidRealtimePath { value } => {
                write!(f, "realtime.path must start with '/' and not be '/', got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

const MIN_JWT_SECRET_LEN: usize = 32;
const MAX_POOL_SIZE: u32 = 1000;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

type Errors = Vec<ConfigValidationError>;

fn empty(name: &str) -> ConfigValidationError {
    ConfigValidationError::EmptyValue { name: name.to_string() }
}

fn require_positive(errors: &mut Errors, name: &str, value: u64) {
    if value == 0 {
        errors.push(ConfigValidationError::NonPositiveTimeout {
            name: name.to_string(),
            value,
        });
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates every section, collecting all errors rather than stopping
    /// at the first.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Errors::new();

        Self::security(&config.security, &mut errors);
        Self::server(&config.server, &mut errors);
        Self::redis(&config.redis, &mut errors);
        Self::jobs(&config.jobs, &mut errors);
        Self::storage(&config.storage, &mut errors);
        Self::realtime(&config.realtime, &mut errors);
        Self::observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn security(config: &crate::SecurityConfig, errors: &mut Errors) {
        if config.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            errors.push(ConfigValidationError::JwtSecretTooShort {
                actual: config.jwt_secret.len(),
                minimum: MIN_JWT_SECRET_LEN,
            });
        }
        require_positive(
            errors,
            "security.jwt_access_expiration_secs",
            config.jwt_access_expiration_secs,
        );
        if config.token_cookie.trim().is_empty() {
            errors.push(empty("security.token_cookie"));
        }
    }

    fn server(config: &crate::ServerConfig, errors: &mut Errors) {
        if config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: config.port,
            });
        }
        require_positive(errors, "server.request_timeout_secs", config.request_timeout_secs);
    }

    fn redis(config: &crate::RedisConfig, errors: &mut Errors) {
        if !config.enabled {
            return;
        }

        let problem = if config.url.is_empty() {
            Some("URL cannot be empty".to_string())
        } else {
            match Url::parse(&config.url) {
                Ok(url) if matches!(url.scheme(), "redis" | "rediss") => None,
                Ok(url) => Some(format!("unsupported scheme '{}'", url.scheme())),
                Err(e) => Some(e.to_string()),
            }
        };
        if let Some(message) = problem {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message,
            });
        }

        if !(1..=MAX_POOL_SIZE).contains(&config.pool_size) {
            errors.push(ConfigValidationError::InvalidPoolSize {
                value: config.pool_size,
                maximum: MAX_POOL_SIZE,
            });
        }
    }

    fn jobs(config: &crate::JobsConfig, errors: &mut Errors) {
        if config.concurrency == 0 {
            errors.push(ConfigValidationError::ZeroConcurrency);
        }
        if config.key_prefix.trim().is_empty() {
            errors.push(empty("jobs.key_prefix"));
        }
        if config.queue_name.trim().is_empty() {
            errors.push(empty("jobs.queue_name"));
        }

        require_positive(errors, "jobs.lock_ttl_ms", config.lock_ttl_ms);
        require_positive(errors, "jobs.poll_interval_ms", config.poll_interval_ms);
        require_positive(errors, "jobs.contention_delay_ms", config.contention_delay_ms);
        require_positive(errors, "jobs.visibility_timeout_secs", config.visibility_timeout_secs);
        require_positive(errors, "jobs.recovery_interval_secs", config.recovery_interval_secs);
        require_positive(errors, "jobs.render_timeout_secs", config.render_timeout_secs);

        if !config.contention_multiplier.is_finite() || config.contention_multiplier < 1.0 {
            errors.push(ConfigValidationError::InvalidMultiplier {
                value: config.contention_multiplier,
            });
        }

        // render < lock TTL < visibility
        if config.lock_ttl_ms == 0 {
            return;
        }
        let render_ms = config.render_timeout_secs.saturating_mul(1000);
        if render_ms >= config.lock_ttl_ms {
            errors.push(ConfigValidationError::RenderOutlivesLock {
                render_ms,
                lock_ttl_ms: config.lock_ttl_ms,
            });
        }
        let visibility_ms = config.visibility_timeout_secs.saturating_mul(1000);
        if visibility_ms <= config.lock_ttl_ms {
            errors.push(ConfigValidationError::VisibilityBelowLockTtl {
                visibility_ms,
                lock_ttl_ms: config.lock_ttl_ms,
            });
        }
    }

    fn storage(config: &crate::StorageConfig, errors: &mut Errors) {
        if config.upload_root.as_os_str().is_empty() {
            errors.push(empty("storage.upload_root"));
        }
        if config.thumbnail_dir.as_os_str().is_empty() {
            errors.push(empty("storage.thumbnail_dir"));
        }
        if config.thumbnail_size == 0 {
            errors.push(empty("storage.thumbnail_size"));
        }
    }

    fn realtime(config: &crate::RealtimeConfig, errors: &mut Errors) {
        if !config.path.starts_with('/') || config.path == "/" {
            errors.push(ConfigValidationError::InvalidRealtimePath {
                value: config.path.clone(),
            });
        }
        if config.bus_capacity == 0 {
            errors.push(empty("realtime.bus_capacity"));
        }
        require_positive(
            errors,
            "realtime.heartbeat_interval_secs",
            config.heartbeat_interval_secs,
        );
    }

    fn observability(config: &crate::ObservabilityConfig, errors: &mut Errors) {
        if !LOG_LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        let telemetry = &config.telemetry;
        if !(0.0..=1.0).contains(&telemetry.sampling_ratio) {
            errors.push(ConfigValidationError::InvalidSamplingRatio {
                value: telemetry.sampling_ratio,
            });
        }
        if let Some(endpoint) = &telemetry.otlp_endpoint {
            if let Err(e) = Url::parse(endpoint) {
                errors.push(ConfigValidationError::InvalidUrl {
                    url_type: "otlp_endpoint".to_string(),
                    message: format!("{endpoint}: {e}"),
                });
            }
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors.iter().enumerate().fold(
        String::from("Configuration validation failed:\n"),
        |mut out, (i, error)| {
            out.push_str(&format!("  {}. {error}\n", i + 1));
            out
        },
    )
}
