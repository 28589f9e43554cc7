use super::{MediaRenderer, RenderOutput, RenderRequest, ThumbnailTarget};
use crate::error::{JobError, JobResult};
use crate::uploads::UploadRoot;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::ImageFormat;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cover-fit resize of still images into a square WebP.
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    uploads: UploadRoot,
    target: ThumbnailTarget,
}

impl ImageRenderer {
    pub fn new(uploads: UploadRoot, target: ThumbnailTarget) -> Self {
        Self { uploads, target }
    }

    /// Where sources are read from.
    pub fn uploads(&self) -> &UploadRoot {
        &self.uploads
    }

    /// Output settings.
    pub fn target(&self) -> &ThumbnailTarget {
        &self.target
    }

    /// Renders an arbitrary source file for a job.
    ///
    /// Shared with the video renderer, which feeds it an extracted frame.
    pub(crate) async fn render_file(
        &self,
        source: &Path,
        request: &RenderRequest,
    ) -> JobResult<RenderOutput> {
        let artifact_path = self
            .target
            .artifact_path(&request.owner_id, &request.job_id)?;

        let source = source.to_path_buf();
        let output = artifact_path.clone();
        let size = self.target.size();

        // The blocking resize cannot be cancelled. If this future is dropped
        // (render timeout), the flag stops it before it writes anything.
        let abandoned = Arc::new(AtomicBool::new(false));
        let _guard = AbandonOnDrop(abandoned.clone());
        tokio::task::spawn_blocking(move || resize_to_webp(&source, &output, size, &abandoned))
            .await
            .map_err(|e| JobError::Internal(format!("Render task failed: {e}")))??;

        debug!(job_id = %request.job_id, path = %artifact_path.display(), "Wrote thumbnail");
        Ok(RenderOutput {
            result_ref: self.target.public_url(&request.owner_id, &request.job_id),
            artifact_path,
        })
    }
}

struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn resize_to_webp(source: &Path, output: &Path, size: u32, abandoned: &AtomicBool) -> JobResult<()> {
    let img = image::open(source).map_err(|e| JobError::Render(e.to_string()))?;
    let thumb = img.resize_to_fill(size, size, FilterType::Lanczos3).to_rgba8();

    if abandoned.load(Ordering::SeqCst) {
        return Err(JobError::Render("Render abandoned before writing".to_string()));
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| JobError::Render(format!("Cannot create {}: {e}", parent.display())))?;
    }
    thumb
        .save_with_format(output, ImageFormat::WebP)
        .map_err(|e| JobError::Render(e.to_string()))
}

#[async_trait]
impl MediaRenderer for ImageRenderer {
    async fn render(&self, request: &RenderRequest) -> JobResult<RenderOutput> {
        let source = self
            .uploads
            .resolve(&request.owner_id, &request.input_ref)
            .await?;
        self.render_file(&source, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lumen_core::{JobId, OwnerId};
    use tempfile::TempDir;

    fn request(owner: &str, input_ref: &str) -> RenderRequest {
        RenderRequest {
            job_id: JobId::from("j1"),
            owner_id: OwnerId::from(owner),
            input_ref: input_ref.to_string(),
        }
    }

    fn renderer(dir: &TempDir) -> ImageRenderer {
        ImageRenderer::new(
            UploadRoot::new(dir.path().join("uploads")),
            ThumbnailTarget::new(dir.path().join("thumbs"), "/uploads/thumbnails", 128),
        )
    }

    fn upload(dir: &TempDir, relative: &str, contents: Option<&[u8]>) {
        let path = dir.path().join("uploads").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        match contents {
            Some(bytes) => std::fs::write(&path, bytes).unwrap(),
            None => RgbImage::from_pixel(300, 150, Rgb([200, 40, 40]))
                .save(&path)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_renders_square_webp() {
        let dir = tempfile::tempdir().unwrap();
        upload(&dir, "u1/wide.png", None);

        let output = renderer(&dir)
            .render(&request("u1", "u1/wide.png"))
            .await
            .unwrap();

        assert_eq!(output.result_ref, "/uploads/thumbnails/u1/j1.webp");
        assert_eq!(output.artifact_path, dir.path().join("thumbs/u1/j1.webp"));

        let thumb = image::open(&output.artifact_path).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (128, 128));
    }

    #[tokio::test]
    async fn test_missing_input_is_job_fault() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads/u1")).unwrap();

        let err = renderer(&dir)
            .render(&request("u1", "u1/gone.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InputMissing { .. }));
        assert!(err.is_job_fault());
    }

    #[tokio::test]
    async fn test_other_owners_upload_is_not_read() {
        let dir = tempfile::tempdir().unwrap();
        upload(&dir, "u2/private.png", None);
        let absolute = dir.path().join("uploads/u2/private.png").display().to_string();

        let renderer = renderer(&dir);
        for input in ["u2/private.png", absolute.as_str()] {
            let err = renderer.render(&request("u1", input)).await.unwrap_err();
            assert!(matches!(err, JobError::InputRejected(_)), "{input}: {err:?}");
        }
        assert!(!dir.path().join("thumbs/u1/j1.webp").exists());
    }

    #[test]
    fn test_abandoned_resize_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        upload(&dir, "u1/wide.png", None);
        let output = dir.path().join("thumbs/u1/j1.webp");

        let err = resize_to_webp(
            &dir.path().join("uploads/u1/wide.png"),
            &output,
            64,
            &AtomicBool::new(true),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::Render(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_garbage_input_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        upload(&dir, "u1/fake.png", Some(b"not an image"));

        let err = renderer(&dir)
            .render(&request("u1", "u1/fake.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Render(_)));
    }
}
