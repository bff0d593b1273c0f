//! Derived thumbnail generation
//!
//! A thumbnail is one still frame sampled from the uploaded video. Sampling
//! waits for the video metadata, then for the seek to the sample offset; the
//! whole chain is bounded by a timeout and can be cancelled.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ThumbnailConfig;
use crate::error::ThumbnailError;
use crate::media::{ImageAsset, VideoFile};

/// Metadata needed to pick a frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoProbe {
    pub duration: Option<Duration>,
    pub frame_rate: Option<f64>,
    pub width: u32,
    pub height: u32,
}

/// Source of video frames
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Put an in-memory video where `probe` and `sample` can both read it.
    ///
    /// The returned file backs the video until it is dropped. Samplers that read
    /// bytes directly keep the default.
    async fn stage(&self, _video: &VideoFile) -> Result<Option<NamedTempFile>, ThumbnailError> {
        Ok(None)
    }

    /// Load the video metadata
    async fn probe(&self, video: &VideoFile) -> Result<VideoProbe, ThumbnailError>;

    /// Seek to `at` and encode that frame
    async fn sample(&self, video: &VideoFile, at: Duration) -> Result<ImageAsset, ThumbnailError>;
}

/// Pick the playback position to sample.
///
/// Videos longer than `requested` are sampled at `requested`. Shorter videos
/// are clamped to their last frame. Videos with no known duration use the
/// first frame.
pub fn sample_offset(probe: &VideoProbe, requested: Duration, fallback_fps: f64) -> Duration {
    let duration = match probe.duration {
        Some(d) if !d.is_zero() => d,
        _ => return Duration::ZERO,
    };

    if duration > requested {
        return requested;
    }

    let frame = probe
        .frame_rate
        .and_then(frame_interval)
        .or_else(|| frame_interval(fallback_fps));

    match frame {
        Some(frame) => duration.saturating_sub(frame),
        None => Duration::ZERO,
    }
}

/// Length of one frame, if `fps` describes a representable interval
fn frame_interval(fps: f64) -> Option<Duration> {
    if !(fps.is_finite() && fps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

/// Produces the derived thumbnail for a video
#[derive(Clone)]
pub struct ThumbnailGenerator {
    sampler: Arc<dyn FrameSampler>,
    offset: Duration,
    timeout: Duration,
    fallback_fps: f64,
}

impl ThumbnailGenerator {
    pub fn new(sampler: Arc<dyn FrameSampler>, config: &ThumbnailConfig) -> Self {
        Self {
            sampler,
            offset: config.offset(),
            timeout: config.timeout(),
            fallback_fps: config.fallback_fps,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sample the thumbnail frame, giving up after the configured timeout
    pub async fn generate(
        &self,
        video: &VideoFile,
        cancel: &CancellationToken,
    ) -> Result<ImageAsset, ThumbnailError> {
        let work = async {
            let staged = self.sampler.stage(video).await?;
            let staged_video;
            let video = match &staged {
                Some(file) => {
                    staged_video = video.clone().with_source_path(file.path());
                    &staged_video
                }
                None => video,
            };

            let probe = self.sampler.probe(video).await?;
            let at = sample_offset(&probe, self.offset, self.fallback_fps);
            debug!(
                "Sampling {} at {:.3}s (duration {:?})",
                video.name(),
                at.as_secs_f64(),
                probe.duration
            );

            let frame = self.sampler.sample(video, at).await?;
            if frame.is_empty() {
                return Err(ThumbnailError::EmptyFrame);
            }
            Ok(frame)
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ThumbnailError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, work) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ThumbnailError::Timeout(self.timeout)),
            },
        };

        match &result {
            Ok(frame) => info!("🖼️  Thumbnail ready for {} ({} bytes)", video.name(), frame.len()),
            Err(e) => warn!("Thumbnail generation failed for {}: {}", video.name(), e),
        }

        result
    }
}
