//! Shared fixtures for job pipeline integration tests.
//!
//! Everything runs on the in-memory backends; the event bus records
//! publishes synchronously so assertions need no settling delay.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use lumen_core::{JobEvent, JobId, JobStatus, MediaKind, OwnerId, ThumbnailJob};
use lumen_jobs::redis::RedisKeys;
use lumen_jobs::{
    ContentionPolicy, DistributedLock, EnqueueRequest, EventBus, EventHandler,
    InMemoryCoordinationStore, InMemoryJobStore, InMemoryWorkQueue, JobError, JobProcessor,
    JobResult, JobService, JobStore, MediaRenderer, ProcessorConfig, RenderOutput,
    RenderRequest, RendererRegistry, Subscription, ThumbnailTarget, UploadRoot, WorkQueue,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Event bus that records every publish in order.
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingBus {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }

    pub fn statuses_for(&self, job_id: &str) -> Vec<JobStatus> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id.as_str() == job_id)
            .map(|e| e.status)
            .collect()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event: &JobEvent) -> JobResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn subscribe(&self, _handler: Arc<dyn EventHandler>) -> JobResult<Subscription> {
        Err(JobError::Internal("recording bus has no subscribers".to_string()))
    }
}

/// Renderer that tracks overlap per owner and across owners.
pub struct TrackingRenderer {
    delay: Duration,
    active: Mutex<HashMap<OwnerId, usize>>,
    max_per_owner: AtomicUsize,
    total: AtomicUsize,
    max_total: AtomicUsize,
    renders: AtomicUsize,
}

impl TrackingRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: Mutex::new(HashMap::new()),
            max_per_owner: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            max_total: AtomicUsize::new(0),
            renders: AtomicUsize::new(0),
        }
    }

    pub fn max_per_owner(&self) -> usize {
        self.max_per_owner.load(Ordering::SeqCst)
    }

    pub fn max_total(&self) -> usize {
        self.max_total.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaRenderer for TrackingRenderer {
    async fn render(&self, request: &RenderRequest) -> JobResult<RenderOutput> {
        {
            let mut active = self.active.lock();
            let n = active.entry(request.owner_id.clone()).or_default();
            *n += 1;
            self.max_per_owner.fetch_max(*n, Ordering::SeqCst);
        }
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total.fetch_max(total, Ordering::SeqCst);
        self.renders.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.total.fetch_sub(1, Ordering::SeqCst);
        if let Some(n) = self.active.lock().get_mut(&request.owner_id) {
            *n -= 1;
        }

        Ok(RenderOutput {
            result_ref: format!("/uploads/thumbnails/{}/{}.webp", request.owner_id, request.job_id),
            artifact_path: PathBuf::new(),
        })
    }
}

/// Job store that can be switched to fail every write.
pub struct FlakyStore {
    inner: InMemoryJobStore,
    pub failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert_if_absent(&self, job: &ThumbnailJob) -> JobResult<bool> {
        self.inner.insert_if_absent(job).await
    }

    async fn get(&self, job_id: &JobId) -> JobResult<Option<ThumbnailJob>> {
        self.inner.get(job_id).await
    }

    async fn save(&self, job: &ThumbnailJob) -> JobResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JobError::Store("store unavailable".to_string()));
        }
        self.inner.save(job).await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> JobResult<Vec<ThumbnailJob>> {
        self.inner.list_by_owner(owner).await
    }
}

pub fn fast_config() -> ProcessorConfig {
    ProcessorConfig {
        lock_ttl: Duration::from_secs(5),
        render_timeout: Duration::from_secs(2),
        contention: ContentionPolicy::fixed(Duration::from_millis(10), 0),
    }
}

/// A wired pipeline over in-memory backends.
pub struct Harness {
    pub dir: TempDir,
    pub queue: Arc<InMemoryWorkQueue>,
    pub store: Arc<dyn JobStore>,
    pub lock: DistributedLock,
    pub bus: Arc<RecordingBus>,
    pub service: JobService,
    pub processor: JobProcessor,
}

impl Harness {
    /// The real image renderer, reading uploads from and writing thumbnails
    /// into a temp dir.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = ThumbnailTarget::new(dir.path().join("thumbs"), "/uploads/thumbnails", 128);
        let images = Arc::new(lumen_jobs::ImageRenderer::new(
            UploadRoot::new(dir.path().join("uploads")),
            target,
        ));
        let registry = RendererRegistry::new().register(MediaKind::Image, images);
        Self::build(dir, registry, Arc::new(InMemoryJobStore::new()), fast_config())
    }

    pub fn with(registry: RendererRegistry, store: Arc<dyn JobStore>, config: ProcessorConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self::build(dir, registry, store, config)
    }

    fn build(
        dir: TempDir,
        registry: RendererRegistry,
        store: Arc<dyn JobStore>,
        config: ProcessorConfig,
    ) -> Self {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let lock = DistributedLock::new(
            Arc::new(InMemoryCoordinationStore::new()),
            RedisKeys::new("test"),
        );
        let bus = Arc::new(RecordingBus::default());
        let service = JobService::new(store.clone(), queue.clone(), "thumbnail-jobs");
        let processor = JobProcessor::new(
            queue.clone(),
            lock.clone(),
            store.clone(),
            registry,
            bus.clone(),
            config,
        );
        Self {
            dir,
            queue,
            store,
            lock,
            bus,
            service,
            processor,
        }
    }

    /// Uploads a small PNG for `owner` and returns its input reference.
    pub fn write_png(&self, owner: &str, name: &str) -> String {
        let dir = self.dir.path().join("uploads").join(owner);
        std::fs::create_dir_all(&dir).expect("upload dir");
        RgbImage::from_pixel(64, 48, Rgb([20, 120, 220]))
            .save_with_format(dir.join(name), ImageFormat::Png)
            .expect("write png");
        format!("{owner}/{name}")
    }

    pub fn request(&self, job: &str, owner: &str, input: &str, kind: &str) -> EnqueueRequest {
        EnqueueRequest {
            job_id: JobId::from(job),
            owner_id: OwnerId::from(owner),
            input_ref: input.to_string(),
            media_kind: kind.to_string(),
            filename: input.rsplit('/').next().unwrap_or_default().to_string(),
        }
    }

    pub async fn job(&self, job_id: &str) -> ThumbnailJob {
        self.store
            .get(&JobId::from(job_id))
            .await
            .expect("store get")
            .expect("job exists")
    }

    /// Returns true if nobody holds the owner's lock.
    pub async fn lock_is_free(&self, owner: &str) -> bool {
        let owner = OwnerId::from(owner);
        match self.lock.acquire(&owner, Duration::from_secs(1)).await.expect("acquire") {
            Some(token) => {
                self.lock.release(&token).await.expect("release");
                true
            }
            None => false,
        }
    }

    pub async fn queue_is_drained(&self) -> bool {
        self.queue.pending_count().await.expect("pending") == 0
            && self.queue.in_flight_count().await.expect("in flight") == 0
    }
}
