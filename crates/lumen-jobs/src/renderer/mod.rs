//! Thumbnail renderers.
//!
//! A renderer turns an uploaded file into a square WebP thumbnail stored
//! under `<thumbnail_dir>/<owner>/<job>.webp` and reports its public URL.
//! Sources are only ever read through [`UploadRoot::resolve`].

mod image;
mod video;

pub use self::image::ImageRenderer;
pub use self::video::{FfmpegTools, VideoRenderer};

use crate::error::{JobError, JobResult};
use crate::uploads::UploadRoot;
use async_trait::async_trait;
use lumen_config::StorageConfig;
use lumen_core::{JobId, MediaKind, OwnerId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    /// Uploaded source, relative to the upload root.
    pub input_ref: String,
}

/// A finished thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    /// Public URL of the thumbnail.
    pub result_ref: String,
    /// Where the file was written.
    pub artifact_path: PathBuf,
}

/// Produces a thumbnail for one media kind.
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    /// Render the thumbnail, or fail with a job fault.
    async fn render(&self, request: &RenderRequest) -> JobResult<RenderOutput>;
}

/// Output location and size shared by all renderers.
#[derive(Debug, Clone)]
pub struct ThumbnailTarget {
    dir: PathBuf,
    public_prefix: String,
    size: u32,
}

impl ThumbnailTarget {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>, size: u32) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            size: size.max(1),
        }
    }

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// File path for a job's thumbnail.
    pub fn artifact_path(&self, owner: &OwnerId, job: &JobId) -> JobResult<PathBuf> {
        let owner = safe_component(owner.as_str())?;
        let job = safe_component(job.as_str())?;
        Ok(self.dir.join(owner).join(format!("{job}.webp")))
    }

    /// Public URL for a job's thumbnail.
    pub fn public_url(&self, owner: &OwnerId, job: &JobId) -> String {
        format!("{}/{}/{}.webp", self.public_prefix, owner, job)
    }
}

impl From<&StorageConfig> for ThumbnailTarget {
    fn from(config: &StorageConfig) -> Self {
        Self::new(
            config.thumbnail_dir.clone(),
            config.public_prefix.clone(),
            config.thumbnail_size,
        )
    }
}

fn safe_component(value: &str) -> JobResult<&str> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(JobError::Render(format!(
            "Unsafe path component in thumbnail target: {value:?}"
        )));
    }
    Ok(value)
}

/// Fails with [`JobError::InputMissing`] unless `path` is an existing file.
pub(crate) async fn ensure_input(path: &Path) -> JobResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(JobError::InputMissing {
            path: path.display().to_string(),
        }),
    }
}

/// Maps media kinds to renderers.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<MediaKind, Arc<dyn MediaRenderer>>,
}

impl RendererRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Image and video renderers configured from storage settings.
    pub fn with_defaults(config: &StorageConfig) -> Self {
        let images = Arc::new(ImageRenderer::new(
            UploadRoot::from(config),
            ThumbnailTarget::from(config),
        ));
        let videos = VideoRenderer::new(
            images.clone(),
            FfmpegTools::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone()),
        );
        Self::new()
            .register(MediaKind::Image, images)
            .register(MediaKind::Video, Arc::new(videos))
    }

    /// Add or replace the renderer for a kind.
    #[must_use]
    pub fn register(mut self, kind: MediaKind, renderer: Arc<dyn MediaRenderer>) -> Self {
        self.renderers.insert(kind, renderer);
        self
    }

    /// Renderer for a raw media kind string.
    pub fn resolve(&self, media_kind: &str) -> JobResult<Arc<dyn MediaRenderer>> {
        MediaKind::parse(media_kind)
            .and_then(|kind| self.renderers.get(&kind).cloned())
            .ok_or_else(|| JobError::UnsupportedMedia(media_kind.to_string()))
    }
}
