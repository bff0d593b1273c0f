//! Error types for the upload submission flow

use std::fmt;

use crate::client::Endpoint;

/// Result type for submission operations
pub type Result<T> = std::result::Result<T, SubmissionError>;

/// Input that has to be present before a submission can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Video,
    Thumbnail,
    Title,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingField::Video => "video",
            MissingField::Thumbnail => "thumbnail",
            MissingField::Title => "room title",
        };
        f.write_str(name)
    }
}

/// Errors raised while deriving a thumbnail from a video
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("thumbnail generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("thumbnail generation was cancelled")]
    Cancelled,

    #[error("failed to read video metadata: {0}")]
    Probe(String),

    #[error("failed to sample video frame: {0}")]
    Sample(String),

    #[error("sampled frame was empty")]
    EmptyFrame,
}

/// Errors raised by a submission
///
/// Every variant aborts the whole submission. There is no partial result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("missing input: {0}")]
    MissingInput(MissingField),

    #[error("{endpoint} service returned HTTP {status}")]
    RemoteService { endpoint: Endpoint, status: u16 },

    #[error("network error calling {endpoint} service: {message}")]
    Network { endpoint: Endpoint, message: String },

    #[error("unexpected response from {endpoint} service: {message}")]
    Decode { endpoint: Endpoint, message: String },

    #[error("video rejected: {0}")]
    InvalidVideo(String),

    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),

    #[error("a submission is already in progress")]
    AlreadySubmitting,

    #[error("submission was cancelled")]
    Cancelled,

    #[error("superseded by a newer upload")]
    Superseded,
}

impl SubmissionError {
    /// Service-side and transport failures look the same to the user
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            SubmissionError::RemoteService { .. } | SubmissionError::Network { .. }
        )
    }

    /// Endpoint involved in the failure, if any
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            SubmissionError::RemoteService { endpoint, .. }
            | SubmissionError::Network { endpoint, .. }
            | SubmissionError::Decode { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }

    /// Short notice suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::MissingInput(field) => format!("Please add a {} first.", field),
            SubmissionError::InvalidVideo(reason) => format!("This video can't be used: {}.", reason),
            SubmissionError::Thumbnail(_) => {
                "We couldn't create a preview from this video. Try choosing a thumbnail image.".to_string()
            }
            SubmissionError::AlreadySubmitting => "Your memory room is already being created.".to_string(),
            SubmissionError::Cancelled | SubmissionError::Superseded => {
                "The upload was stopped.".to_string()
            }
            _ => "Something went wrong while creating your memory room. Please try again.".to_string(),
        }
    }
}
