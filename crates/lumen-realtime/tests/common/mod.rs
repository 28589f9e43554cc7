//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use lumen_config::{RealtimeConfig, SecurityConfig, ServerConfig};
use lumen_core::{MediaKind, OwnerId};
use lumen_jobs::redis::RedisKeys;
use lumen_jobs::{
    DistributedLock, EventBus, InMemoryCoordinationStore, InMemoryJobStore, InMemoryWorkQueue,
    InProcessEventBus, JobProcessor, JobResult, JobService, MediaRenderer, Outcome,
    ProcessorConfig, RenderOutput, RenderRequest, RendererRegistry, Subscription, WorkQueue,
};
use lumen_realtime::{create_router, AppState, Gateway, JwtSessionAuthenticator, RelayHandler};
use lumen_security::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

/// Renderer that succeeds without touching the filesystem.
pub struct StubRenderer;

#[async_trait]
impl MediaRenderer for StubRenderer {
    async fn render(&self, request: &RenderRequest) -> JobResult<RenderOutput> {
        Ok(RenderOutput {
            result_ref: format!("/uploads/thumbnails/{}/{}.webp", request.owner_id, request.job_id),
            artifact_path: PathBuf::new(),
        })
    }
}

/// A gateway process over in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<Gateway>,
    pub tokens: TokenProvider,
    pub queue: Arc<InMemoryWorkQueue>,
    pub processor: JobProcessor,
    pub bus: Arc<InProcessEventBus>,
    _relay: Subscription,
}

impl TestApp {
    pub async fn new() -> Self {
        let tokens = TokenProvider::new(Arc::new(SecurityConfig::default()));
        let gateway = Arc::new(Gateway::new(Arc::new(JwtSessionAuthenticator::new(
            tokens.clone(),
        ))));

        let queue = Arc::new(InMemoryWorkQueue::new());
        let store = Arc::new(InMemoryJobStore::new());
        let bus = Arc::new(InProcessEventBus::default());
        let relay = bus
            .subscribe(Arc::new(RelayHandler::new(gateway.clone())))
            .await
            .expect("subscribe relay");

        let processor = JobProcessor::new(
            queue.clone(),
            DistributedLock::new(Arc::new(InMemoryCoordinationStore::new()), RedisKeys::new("test")),
            store.clone(),
            RendererRegistry::new().register(MediaKind::Image, Arc::new(StubRenderer)),
            bus.clone(),
            ProcessorConfig::default(),
        );

        let jobs = JobService::new(store, queue.clone(), "thumbnail-jobs");
        let state = AppState::new(gateway.clone(), jobs, "token");
        let router = create_router(state, &ServerConfig::default(), &RealtimeConfig::default());

        Self {
            router,
            gateway,
            tokens,
            queue,
            processor,
            bus,
            _relay: relay,
        }
    }

    pub fn token(&self, owner: &str) -> String {
        self.tokens
            .generate_access_token(&OwnerId::from(owner), None)
            .expect("token")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Dequeues and processes one job.
    pub async fn process_next(&self) -> Outcome {
        let delivery = self
            .queue
            .dequeue("test-consumer")
            .await
            .expect("dequeue")
            .expect("a queued job");
        self.processor.process(&delivery).await.expect("process")
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub fn post_json(uri: &str, token: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}
