/// XPERI3D Memory Room Uploader
///
/// Turns a user's video into the inputs of a memory room: samples a thumbnail
/// frame, sends thumbnail and video to the depth-analysis and description
/// services, and tracks the upload through an explicit state machine.

pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod state;
pub mod submission;
pub mod thumbnail;
pub mod video;

// Re-export main types for easy access
pub use crate::client::{Endpoint, HttpProcessingService, ProcessingService};
pub use crate::config::{Config, ConfigBuilder, SubmitStrategy};
pub use crate::error::{MissingField, SubmissionError, ThumbnailError};
pub use crate::media::{ImageAsset, VideoFile};
pub use crate::state::{MemoryKind, RoomDetails, UploadSession, UploadState};
pub use crate::submission::{SubmissionResult, Submitter};
pub use crate::thumbnail::{FrameSampler, ThumbnailGenerator, VideoProbe};
pub use crate::video::FfmpegFrameSampler;
