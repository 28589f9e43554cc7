//! Video thumbnails: probe the duration, grab the middle frame, then render
//! that frame like a still image.

use super::{ImageRenderer, MediaRenderer, RenderOutput, RenderRequest};
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Paths of the ffmpeg binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Container duration in seconds; `0.0` if ffprobe reports none.
    ///
    /// The child is killed if this future is dropped, as it is when a
    /// render times out.
    pub async fn probe_duration(&self, path: &Path) -> JobResult<f64> {
        let output = Command::new(&self.ffprobe)
            .kill_on_drop(true)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(|e| JobError::Render(format!("ffprobe not available: {e}")))?;

        if !output.status.success() {
            return Err(JobError::Render(format!(
                "ffprobe failed (exit code {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| JobError::Render(format!("Unreadable ffprobe output: {e}")))?;

        Ok(probe
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0))
    }

    /// Writes the frame at `timestamp_secs` to `output` as PNG.
    pub async fn extract_frame(&self, video: &Path, output: &Path, timestamp_secs: f64) -> JobResult<()> {
        let result = Command::new(&self.ffmpeg)
            .kill_on_drop(true)
            .args(["-y", "-v", "error", "-ss", &format!("{timestamp_secs:.3}"), "-i"])
            .arg(video)
            .args(["-vframes", "1", "-f", "image2"])
            .arg(output)
            .output()
            .await
            .map_err(|e| JobError::Render(format!("ffmpeg not available: {e}")))?;

        if !result.status.success() {
            return Err(JobError::Render(format!(
                "ffmpeg failed (exit code {:?}): {}",
                result.status.code(),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Renders the middle frame of a video.
pub struct VideoRenderer {
    images: Arc<ImageRenderer>,
    tools: FfmpegTools,
}

impl VideoRenderer {
    pub fn new(images: Arc<ImageRenderer>, tools: FfmpegTools) -> Self {
        Self { images, tools }
    }
}

#[async_trait]
impl MediaRenderer for VideoRenderer {
    async fn render(&self, request: &RenderRequest) -> JobResult<RenderOutput> {
        let source = self
            .images
            .uploads()
            .resolve(&request.owner_id, &request.input_ref)
            .await?;

        let duration = self.tools.probe_duration(&source).await?;
        let midpoint = duration / 2.0;

        let scratch = tempfile::Builder::new()
            .prefix("lumen-frame-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| JobError::Render(format!("Cannot create frame file: {e}")))?;

        self.tools
            .extract_frame(&source, scratch.path(), midpoint)
            .await?;
        debug!(job_id = %request.job_id, timestamp = midpoint, "Extracted video frame");

        // `scratch` is removed on drop, after the image render has read it.
        self.images.render_file(scratch.path(), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::ThumbnailTarget;
    use crate::uploads::UploadRoot;
    use lumen_core::{JobId, OwnerId};
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_video_fails_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("u1")).unwrap();
        let renderer = VideoRenderer::new(
            Arc::new(ImageRenderer::new(
                UploadRoot::new(dir.path()),
                ThumbnailTarget::new(dir.path().join("thumbs"), "/t", 128),
            )),
            FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"),
        );
        let request = RenderRequest {
            job_id: JobId::from("j1"),
            owner_id: OwnerId::from("u1"),
            input_ref: "u1/clip.mp4".to_string(),
        };

        let err = renderer.render(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Input file is missing");
    }

    #[tokio::test]
    async fn test_missing_binary_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"\0\0\0\x18ftypmp42").unwrap();

        let tools = FfmpegTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = tools.probe_duration(&input).await.unwrap_err();
        assert!(matches!(err, JobError::Render(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_ffprobe_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("still-running");
        let script = dir.path().join("slow-ffprobe");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tools = FfmpegTools::new("ffmpeg", script.display().to_string());
        let clip = dir.path().join("clip.mp4");
        let probe = tools.probe_duration(&clip);
        assert!(tokio::time::timeout(Duration::from_millis(100), probe)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
