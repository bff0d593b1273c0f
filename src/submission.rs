//! Submission of a video and its thumbnail to the processing service

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::ProcessingService;
use crate::config::SubmitStrategy;
use crate::error::{MissingField, Result, SubmissionError};
use crate::media::{ImageAsset, VideoFile};

/// Artifacts produced by a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    /// Image returned by the depth-analysis service
    pub processed_image: ImageAsset,
    /// Text returned by the description service
    pub description: String,
    pub completed_at: DateTime<Utc>,
}

/// Sends uploads to a [`ProcessingService`]
#[derive(Clone)]
pub struct Submitter {
    service: Arc<dyn ProcessingService>,
    strategy: SubmitStrategy,
}

impl Submitter {
    pub fn new(service: Arc<dyn ProcessingService>, strategy: SubmitStrategy) -> Self {
        Self { service, strategy }
    }

    pub fn strategy(&self) -> SubmitStrategy {
        self.strategy
    }

    /// Submit the video and thumbnail; both calls must succeed
    pub async fn submit(
        &self,
        video: Option<&VideoFile>,
        thumbnail: Option<&ImageAsset>,
    ) -> Result<SubmissionResult> {
        self.submit_cancellable(video, thumbnail, &CancellationToken::new())
            .await
    }

    /// Like [`Submitter::submit`], dropping in-flight requests once `cancel` fires
    pub async fn submit_cancellable(
        &self,
        video: Option<&VideoFile>,
        thumbnail: Option<&ImageAsset>,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult> {
        let video = video
            .filter(|v| !v.is_empty())
            .ok_or(SubmissionError::MissingInput(MissingField::Video))?;
        let thumbnail = thumbnail
            .filter(|t| !t.is_empty())
            .ok_or(SubmissionError::MissingInput(MissingField::Thumbnail))?;

        let start_time = Instant::now();
        info!(
            "🚀 Submitting {} ({:.1} MB) with {} thumbnail [{:?}]",
            video.name(),
            video.size() as f64 / 1_000_000.0,
            thumbnail.mime_type(),
            self.strategy
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SubmissionError::Cancelled),
            result = self.run(video, thumbnail) => result,
        };

        match &result {
            Ok(r) => info!(
                "✅ Submission completed in {:.2}s: {} image ({} bytes), {} characters of description",
                start_time.elapsed().as_secs_f64(),
                r.processed_image.mime_type(),
                r.processed_image.len(),
                r.description.len()
            ),
            Err(e) => error!("❌ Submission of {} failed: {}", video.name(), e),
        }

        result
    }

    async fn run(&self, video: &VideoFile, thumbnail: &ImageAsset) -> Result<SubmissionResult> {
        let (processed_image, description) = match self.strategy {
            SubmitStrategy::Concurrent => {
                let (depth, describe) = futures::future::join(
                    self.service.analyze_depth(thumbnail),
                    self.service.describe(video),
                )
                .await;
                // Both outcomes are in; the depth-analysis failure wins when both fail
                (depth?, describe?)
            }
            SubmitStrategy::Sequential => {
                let processed_image = self.service.analyze_depth(thumbnail).await?;
                let description = self.service.describe(video).await?;
                (processed_image, description)
            }
        };

        Ok(SubmissionResult {
            processed_image,
            description,
            completed_at: Utc::now(),
        })
    }
}
