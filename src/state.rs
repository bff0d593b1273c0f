use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::{MissingField, Result, SubmissionError, ThumbnailError};
use crate::media::{ImageAsset, VideoFile};
use crate::submission::{SubmissionResult, Submitter};
use crate::thumbnail::ThumbnailGenerator;

/// What the uploaded video shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    /// A room or space
    #[default]
    Room,
    /// A single object or item
    Object,
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "room" | "space" => Ok(MemoryKind::Room),
            "object" | "item" => Ok(MemoryKind::Object),
            other => Err(format!("unknown memory kind: {}", other)),
        }
    }
}

/// User-entered details for the memory room being created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub title: String,
    pub description: Option<String>,
    pub kind: MemoryKind,
}

impl RoomDetails {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Upload flow state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadState {
    /// Nothing selected
    #[default]
    Idle,

    /// Video selected, thumbnail being sampled
    ThumbnailPending,

    /// Video and thumbnail present
    ReadyToSubmit,

    /// Both service calls in flight
    Submitting,

    /// Submission finished with both artifacts
    Succeeded(SubmissionResult),

    /// Thumbnail generation or submission failed
    Failed(SubmissionError),
}

impl UploadState {
    /// Get progress percentage for this state
    pub fn progress_percentage(&self) -> u8 {
        match self {
            UploadState::Idle => 0,
            UploadState::ThumbnailPending => 10,
            UploadState::ReadyToSubmit => 25,
            UploadState::Submitting => 50,
            UploadState::Succeeded(_) => 100,
            UploadState::Failed(_) => 0,
        }
    }

    /// Get human-readable status string
    pub fn status_string(&self) -> &'static str {
        match self {
            UploadState::Idle => "Idle",
            UploadState::ThumbnailPending => "Preparing Thumbnail",
            UploadState::ReadyToSubmit => "Ready",
            UploadState::Submitting => "Creating Memory Room",
            UploadState::Succeeded(_) => "Completed",
            UploadState::Failed(_) => "Failed",
        }
    }

    /// True while a thumbnail or submission is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, UploadState::ThumbnailPending | UploadState::Submitting)
    }
}

#[derive(Default)]
struct SessionInner {
    state: UploadState,
    video: Option<VideoFile>,
    derived_thumbnail: Option<ImageAsset>,
    custom_thumbnail: Option<ImageAsset>,
    details: RoomDetails,
    /// Bumped whenever in-flight work is superseded
    epoch: u64,
    in_flight: Option<CancellationToken>,
}

impl SessionInner {
    fn state(&self) -> &UploadState {
        &self.state
    }

    fn set_state(&mut self, state: UploadState) {
        debug!("Upload state -> {}", state.status_string());
        self.state = state;
    }

    fn thumbnail(&self) -> Option<&ImageAsset> {
        self.custom_thumbnail.as_ref().or(self.derived_thumbnail.as_ref())
    }

    /// Cancel whatever is running and invalidate its completion
    fn abort_in_flight(&mut self) -> u64 {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.epoch += 1;
        self.epoch
    }

    fn begin(&mut self, state: UploadState) -> (u64, CancellationToken) {
        let epoch = self.abort_in_flight();
        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        self.set_state(state);
        (epoch, cancel)
    }
}

/// Upload session: the selected video, its thumbnails and the submission state.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct UploadSession {
    inner: Arc<RwLock<SessionInner>>,
    generator: ThumbnailGenerator,
    submitter: Submitter,
    upload_config: UploadConfig,
}

impl UploadSession {
    pub fn new(generator: ThumbnailGenerator, submitter: Submitter, upload_config: UploadConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner::default())),
            generator,
            submitter,
            upload_config,
        }
    }

    pub async fn state(&self) -> UploadState {
        self.inner.read().await.state().clone()
    }

    pub async fn progress(&self) -> u8 {
        self.inner.read().await.state().progress_percentage()
    }

    pub async fn video(&self) -> Option<VideoFile> {
        self.inner.read().await.video.clone()
    }

    /// Thumbnail that would be submitted: the custom one if set, else the derived one
    pub async fn thumbnail(&self) -> Option<ImageAsset> {
        self.inner.read().await.thumbnail().cloned()
    }

    /// Data URI of the current thumbnail, for previews
    pub async fn thumbnail_preview(&self) -> Option<String> {
        self.inner.read().await.thumbnail().map(ImageAsset::to_data_uri)
    }

    pub async fn details(&self) -> RoomDetails {
        self.inner.read().await.details.clone()
    }

    pub async fn set_details(&self, details: RoomDetails) {
        self.inner.write().await.details = details;
    }

    /// Select a new video and derive its thumbnail.
    ///
    /// Replaces any previous video and aborts work still running for it.
    pub async fn select_video(&self, video: VideoFile) -> Result<ImageAsset> {
        if let Err(e) = video.validate(&self.upload_config) {
            warn!("Rejected video {}: {}", video.name(), e);
            return Err(e);
        }

        info!(
            "📥 Video selected: {} ({}, {:.1} MB)",
            video.name(),
            video.mime_type(),
            video.size() as f64 / 1_000_000.0
        );

        let (epoch, cancel) = {
            let mut inner = self.inner.write().await;
            inner.video = Some(video.clone());
            inner.derived_thumbnail = None;
            inner.custom_thumbnail = None;
            inner.begin(UploadState::ThumbnailPending)
        };

        self.finish_thumbnail(epoch, cancel, video).await
    }

    /// Sample the derived thumbnail again for the current video
    pub async fn regenerate_thumbnail(&self) -> Result<ImageAsset> {
        let (epoch, cancel, video) = {
            let mut inner = self.inner.write().await;
            if matches!(inner.state(), UploadState::Submitting) {
                return Err(SubmissionError::AlreadySubmitting);
            }
            let video = inner
                .video
                .clone()
                .ok_or(SubmissionError::MissingInput(MissingField::Video))?;
            inner.derived_thumbnail = None;
            let (epoch, cancel) = inner.begin(UploadState::ThumbnailPending);
            (epoch, cancel, video)
        };

        self.finish_thumbnail(epoch, cancel, video).await
    }

    async fn finish_thumbnail(&self, epoch: u64, cancel: CancellationToken, video: VideoFile) -> Result<ImageAsset> {
        let outcome = self.generator.generate(&video, &cancel).await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!("Discarding stale thumbnail for {}", video.name());
            return Err(SubmissionError::Superseded);
        }
        inner.in_flight = None;

        match outcome {
            Ok(frame) => {
                inner.derived_thumbnail = Some(frame.clone());
                inner.set_state(UploadState::ReadyToSubmit);
                Ok(frame)
            }
            Err(e) => {
                let err = SubmissionError::from(e);
                inner.set_state(UploadState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Use a user-chosen image instead of the derived thumbnail
    pub async fn set_thumbnail(&self, image: ImageAsset) -> Result<()> {
        if image.is_empty() {
            return Err(SubmissionError::MissingInput(MissingField::Thumbnail));
        }

        let mut inner = self.inner.write().await;
        match inner.state() {
            UploadState::Submitting => return Err(SubmissionError::AlreadySubmitting),
            UploadState::ThumbnailPending => {
                inner.abort_in_flight();
            }
            _ => {}
        }
        if inner.video.is_none() {
            return Err(SubmissionError::MissingInput(MissingField::Video));
        }

        info!("🖼️  Custom thumbnail set ({}, {} bytes)", image.mime_type(), image.len());
        inner.custom_thumbnail = Some(image);
        inner.set_state(UploadState::ReadyToSubmit);
        Ok(())
    }

    /// Select a video that comes with its own thumbnail image.
    ///
    /// A failed frame sample is not fatal here since the image replaces it.
    /// Rejected videos and other errors are returned as is.
    pub async fn select_video_with_thumbnail(&self, video: VideoFile, image: ImageAsset) -> Result<()> {
        match self.select_video(video).await {
            Ok(_) => {}
            Err(SubmissionError::Thumbnail(e)) => {
                warn!("Thumbnail sampling failed, using provided image: {}", e);
            }
            Err(e) => return Err(e),
        }
        self.set_thumbnail(image).await
    }

    /// Drop the custom thumbnail and fall back to the derived one.
    ///
    /// Leaves the state alone when no custom thumbnail was set.
    pub async fn remove_thumbnail(&self) -> Result<()> {
        let (epoch, cancel, video) = {
            let mut inner = self.inner.write().await;
            if matches!(inner.state(), UploadState::Submitting) {
                return Err(SubmissionError::AlreadySubmitting);
            }
            if inner.custom_thumbnail.take().is_none() {
                return Ok(());
            }

            let Some(video) = inner.video.clone() else {
                return Ok(());
            };
            if matches!(inner.state(), UploadState::ThumbnailPending) {
                return Ok(());
            }
            if inner.derived_thumbnail.is_some() {
                inner.set_state(UploadState::ReadyToSubmit);
                return Ok(());
            }

            let (epoch, cancel) = inner.begin(UploadState::ThumbnailPending);
            (epoch, cancel, video)
        };

        self.finish_thumbnail(epoch, cancel, video).await.map(|_| ())
    }

    /// Send the video and thumbnail to the processing service.
    ///
    /// Rejected with `AlreadySubmitting` while a submission is in flight.
    /// Inputs are kept after a failure so the user can simply retry.
    pub async fn submit(&self) -> Result<SubmissionResult> {
        let (epoch, cancel, video, thumbnail, title) = {
            let mut inner = self.inner.write().await;
            match inner.state() {
                UploadState::Submitting => return Err(SubmissionError::AlreadySubmitting),
                UploadState::ThumbnailPending => {
                    return Err(SubmissionError::MissingInput(MissingField::Thumbnail))
                }
                _ => {}
            }

            let video = inner
                .video
                .clone()
                .ok_or(SubmissionError::MissingInput(MissingField::Video))?;
            let thumbnail = inner
                .thumbnail()
                .cloned()
                .ok_or(SubmissionError::MissingInput(MissingField::Thumbnail))?;
            let title = inner.details.title.trim().to_string();
            if title.is_empty() {
                return Err(SubmissionError::MissingInput(MissingField::Title));
            }

            let (epoch, cancel) = inner.begin(UploadState::Submitting);
            (epoch, cancel, video, thumbnail, title)
        };

        info!("🏗️  Creating memory room \"{}\"", title);

        let outcome = self
            .submitter
            .submit_cancellable(Some(&video), Some(&thumbnail), &cancel)
            .await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!("Discarding stale submission result for {}", video.name());
            return Err(SubmissionError::Superseded);
        }
        inner.in_flight = None;

        match &outcome {
            Ok(result) => inner.set_state(UploadState::Succeeded(result.clone())),
            Err(e) => inner.set_state(UploadState::Failed(e.clone())),
        }

        outcome
    }

    /// Abort the running submission or thumbnail generation.
    ///
    /// Returns false when nothing was in flight.
    pub async fn cancel(&self) -> bool {
        let mut inner = self.inner.write().await;
        match inner.state() {
            UploadState::Submitting => {
                inner.abort_in_flight();
                inner.set_state(UploadState::ReadyToSubmit);
                info!("🛑 Submission cancelled");
                true
            }
            UploadState::ThumbnailPending => {
                inner.abort_in_flight();
                inner.set_state(UploadState::Failed(ThumbnailError::Cancelled.into()));
                info!("🛑 Thumbnail generation cancelled");
                true
            }
            _ => false,
        }
    }

    /// Discard the video, thumbnails and details
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.abort_in_flight();
        inner.video = None;
        inner.derived_thumbnail = None;
        inner.custom_thumbnail = None;
        inner.details = RoomDetails::default();
        inner.set_state(UploadState::Idle);
    }
}
