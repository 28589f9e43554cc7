//! Dependency wiring.
//!
//! [`AppModuleBuilder`] picks the coordination backend from configuration
//! and builds every component once. [`AppModule`] hands out services that
//! share those components, so workers and gateways in one process see the
//! same queue, lock, store, and bus.

use lumen_config::AppConfig;
use lumen_core::{LumenError, LumenResult};
use lumen_jobs::redis::{
    create_pool, RedisCoordinationStore, RedisEventBus, RedisJobStore, RedisKeys, RedisWorkQueue,
};
use lumen_jobs::{
    DistributedLock, EventBus, InMemoryCoordinationStore, InMemoryJobStore, InMemoryWorkQueue,
    InProcessEventBus, JobProcessor, JobService, JobStore, ProcessorConfig, RendererRegistry,
    WorkQueue, WorkerPool, WorkerPoolConfig,
};
use lumen_realtime::{Gateway, JwtSessionAuthenticator};
use lumen_security::TokenProvider;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Where queue, lock, store, and bus state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Shared Redis; any number of processes.
    Redis,
    /// Process memory; a single process only.
    InMemory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Built components for one process.
#[derive(Clone)]
pub struct AppModule {
    config: Arc<AppConfig>,
    backend: Backend,
    queue: Arc<dyn WorkQueue>,
    lock: DistributedLock,
    store: Arc<dyn JobStore>,
    bus: Arc<dyn EventBus>,
    tokens: TokenProvider,
    gateway: Arc<Gateway>,
}

impl AppModule {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    pub fn token_provider(&self) -> &TokenProvider {
        &self.tokens
    }

    /// The process-wide realtime gateway.
    pub fn gateway(&self) -> Arc<Gateway> {
        self.gateway.clone()
    }

    pub fn job_service(&self) -> JobService {
        JobService::new(
            self.store.clone(),
            self.queue.clone(),
            self.config.jobs.queue_name.clone(),
        )
    }

    pub fn processor(&self) -> JobProcessor {
        JobProcessor::new(
            self.queue.clone(),
            self.lock.clone(),
            self.store.clone(),
            RendererRegistry::with_defaults(&self.config.storage),
            self.bus.clone(),
            ProcessorConfig::from(&self.config.jobs),
        )
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            self.processor(),
            WorkerPoolConfig::from(&self.config.jobs),
        )
    }
}

/// Builds an [`AppModule`] from configuration.
#[derive(Default)]
pub struct AppModuleBuilder {
    config: Option<AppConfig>,
}

impl AppModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Connects the configured backend and builds every component.
    pub async fn build(self) -> LumenResult<AppModule> {
        let config = self.config.unwrap_or_default();
        let keys = RedisKeys::new(config.jobs.key_prefix.clone());

        let (backend, queue, lock, store, bus) = if config.redis.enabled {
            let pool = create_pool(&config.redis).await?;
            let client = redis::Client::open(config.redis.url.as_str()).map_err(|e| {
                LumenError::Configuration(format!("Invalid Redis URL: {e}"))
            })?;

            let queue: Arc<dyn WorkQueue> = Arc::new(RedisWorkQueue::new(
                pool.clone(),
                &keys,
                config.jobs.queue_name.clone(),
            ));
            let lock = DistributedLock::new(
                Arc::new(RedisCoordinationStore::new(pool.clone())),
                keys.clone(),
            );
            let store: Arc<dyn JobStore> = Arc::new(RedisJobStore::new(pool.clone(), keys.clone()));
            let bus: Arc<dyn EventBus> = Arc::new(RedisEventBus::new(pool, client, &keys));
            (Backend::Redis, queue, lock, store, bus)
        } else {
            warn!("Redis disabled; coordination is limited to this process");
            let queue: Arc<dyn WorkQueue> = Arc::new(InMemoryWorkQueue::new());
            let lock = DistributedLock::new(Arc::new(InMemoryCoordinationStore::new()), keys);
            let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
            let bus: Arc<dyn EventBus> =
                Arc::new(InProcessEventBus::new(config.realtime.bus_capacity));
            (Backend::InMemory, queue, lock, store, bus)
        };

        let tokens = TokenProvider::new(Arc::new(config.security.clone()));
        let gateway = Arc::new(Gateway::new(Arc::new(JwtSessionAuthenticator::new(
            tokens.clone(),
        ))));

        info!(backend = %backend, role = %config.role, "Application module built");

        Ok(AppModule {
            config: Arc::new(config),
            backend,
            queue,
            lock,
            store,
            bus,
            tokens,
            gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{JobEvent, JobId, JobStatus, OwnerId};
    use lumen_jobs::EnqueueRequest;
    use lumen_realtime::RelayHandler;
    use std::time::Duration;

    fn in_memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.redis.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_in_memory_module() {
        let module = AppModuleBuilder::new()
            .with_config(in_memory_config())
            .build()
            .await
            .unwrap();
        assert_eq!(module.backend(), Backend::InMemory);

        let outcome = module
            .job_service()
            .enqueue(EnqueueRequest {
                job_id: JobId::from("j1"),
                owner_id: OwnerId::from("u1"),
                input_ref: "u1/a.png".to_string(),
                media_kind: "image/png".to_string(),
                filename: "a.png".to_string(),
            })
            .await
            .unwrap();
        assert!(outcome.created);

        // A second service instance sees the same store.
        let jobs = module.job_service().list_jobs(&OwnerId::from("u1")).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_bus_feeds_gateway() {
        let module = AppModuleBuilder::new()
            .with_config(in_memory_config())
            .build()
            .await
            .unwrap();
        let gateway = module.gateway();
        let _relay = module
            .bus()
            .subscribe(Arc::new(RelayHandler::new(gateway.clone())))
            .await
            .unwrap();

        let token = module
            .token_provider()
            .generate_access_token(&OwnerId::from("u1"), None)
            .unwrap();
        let mut session = gateway.connect(Some(&token)).await.unwrap();

        module
            .bus()
            .publish(&JobEvent {
                job_id: JobId::from("j1"),
                owner_id: OwnerId::from("u1"),
                status: JobStatus::Processing,
                result_ref: None,
                error_message: None,
            })
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), session.outbound.recv())
            .await
            .unwrap();
        assert!(frame.is_some());
    }
}
