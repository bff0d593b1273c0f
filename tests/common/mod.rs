#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use xperi3d_upload::{
    Config, Endpoint, FrameSampler, ImageAsset, ProcessingService, SubmissionError, SubmitStrategy,
    Submitter, ThumbnailError, ThumbnailGenerator, UploadSession, VideoFile, VideoProbe,
};

pub const DEPTH_GIF: &[u8] = b"GIF89a\x02\x00\x02\x00\x80\x00\x00depth-frames";
pub const FRAME_JPEG: &[u8] = b"\xFF\xD8\xFF\xE0sampled-frame";

pub fn test_video(name: &str) -> VideoFile {
    VideoFile::new(name, "video/mp4", format!("video bytes of {}", name).into_bytes())
}

pub fn depth_image() -> ImageAsset {
    ImageAsset::new("image/gif", DEPTH_GIF)
}

/// In-memory processing service with scripted responses
pub struct MockService {
    pub depth_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub thumbnails: Mutex<Vec<ImageAsset>>,
    depth_response: Mutex<Result<ImageAsset, SubmissionError>>,
    describe_response: Mutex<Result<String, SubmissionError>>,
    gate: Option<watch::Receiver<bool>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            depth_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
            thumbnails: Mutex::new(Vec::new()),
            depth_response: Mutex::new(Ok(depth_image())),
            describe_response: Mutex::new(Ok("A bright kitchen with a wooden table".to_string())),
            gate: None,
        }
    }

    /// Calls wait until the returned sender publishes `true`
    pub fn gated(mut self) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn fail_depth(self, status: u16) -> Self {
        self.set_depth(Err(SubmissionError::RemoteService {
            endpoint: Endpoint::DepthAnalysis,
            status,
        }));
        self
    }

    pub fn fail_describe(self, status: u16) -> Self {
        self.set_describe(Err(SubmissionError::RemoteService {
            endpoint: Endpoint::Description,
            status,
        }));
        self
    }

    pub fn set_depth(&self, response: Result<ImageAsset, SubmissionError>) {
        *self.depth_response.lock().unwrap() = response;
    }

    pub fn set_describe(&self, response: Result<String, SubmissionError>) {
        *self.describe_response.lock().unwrap() = response;
    }

    pub fn depth_count(&self) -> usize {
        self.depth_calls.load(Ordering::SeqCst)
    }

    pub fn describe_count(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
    }
}

#[async_trait]
impl ProcessingService for MockService {
    async fn analyze_depth(&self, thumbnail: &ImageAsset) -> Result<ImageAsset, SubmissionError> {
        self.depth_calls.fetch_add(1, Ordering::SeqCst);
        self.thumbnails.lock().unwrap().push(thumbnail.clone());
        self.wait_for_gate().await;
        self.depth_response.lock().unwrap().clone()
    }

    async fn describe(&self, _video: &VideoFile) -> Result<String, SubmissionError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_for_gate().await;
        self.describe_response.lock().unwrap().clone()
    }
}

/// Frame sampler returning a fixed frame for a fixed duration
pub struct FixedSampler {
    pub duration: Duration,
    pub fail: bool,
    pub offsets: Mutex<Vec<Duration>>,
    gate: Option<watch::Receiver<bool>>,
}

impl FixedSampler {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail: false,
            offsets: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Seeks wait until the returned sender publishes `true`
    pub fn gated(mut self) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn sample_count(&self) -> usize {
        self.offsets.lock().unwrap().len()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::from_secs(5))
        }
    }
}

#[async_trait]
impl FrameSampler for FixedSampler {
    async fn probe(&self, _video: &VideoFile) -> Result<VideoProbe, ThumbnailError> {
        Ok(VideoProbe {
            duration: Some(self.duration),
            frame_rate: Some(30.0),
            width: 1920,
            height: 1080,
        })
    }

    async fn sample(&self, _video: &VideoFile, at: Duration) -> Result<ImageAsset, ThumbnailError> {
        if self.fail {
            return Err(ThumbnailError::Sample("codec not supported".to_string()));
        }
        self.offsets.lock().unwrap().push(at);
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        Ok(ImageAsset::new("image/jpeg", FRAME_JPEG))
    }
}

pub fn session_with(service: Arc<MockService>, sampler: Arc<FixedSampler>, strategy: SubmitStrategy) -> UploadSession {
    let config = Config::default();
    let generator = ThumbnailGenerator::new(sampler, &config.thumbnail);
    let submitter = Submitter::new(service, strategy);
    UploadSession::new(generator, submitter, config.upload)
}
