use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ThumbnailConfig;
use crate::error::ThumbnailError;
use crate::media::{ImageAsset, VideoFile};
use crate::thumbnail::{FrameSampler, VideoProbe};

/// Frame sampler backed by the FFmpeg command line tools
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    ffprobe: String,
    ffmpeg: String,
    jpeg_quality: u8,
    max_width: u32,
}

impl FfmpegFrameSampler {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            jpeg_quality: config.jpeg_quality,
            max_width: config.max_width,
        }
    }

    /// Use custom binaries instead of the ones on PATH
    pub fn with_binaries(mut self, ffprobe: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        self.ffprobe = ffprobe.into();
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// FFmpeg needs a file; unstaged in-memory videos are spooled per call
    async fn input_path(&self, video: &VideoFile) -> Result<(PathBuf, Option<NamedTempFile>), ThumbnailError> {
        if let Some(path) = video.source_path() {
            return Ok((path.to_path_buf(), None));
        }

        let temp = spool(video).await?;
        Ok((temp.path().to_path_buf(), Some(temp)))
    }
}

async fn spool(video: &VideoFile) -> Result<NamedTempFile, ThumbnailError> {
    let suffix = Path::new(video.name())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let temp = tempfile::Builder::new()
        .prefix("xperi3d-video-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| ThumbnailError::Probe(format!("cannot create temp file: {}", e)))?;
    tokio::fs::write(temp.path(), video.bytes())
        .await
        .map_err(|e| ThumbnailError::Probe(format!("cannot write temp file: {}", e)))?;

    debug!("Spooled {} to {}", video.name(), temp.path().display());
    Ok(temp)
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn stage(&self, video: &VideoFile) -> Result<Option<NamedTempFile>, ThumbnailError> {
        if video.source_path().is_some() {
            return Ok(None);
        }
        spool(video).await.map(Some)
    }

    async fn probe(&self, video: &VideoFile) -> Result<VideoProbe, ThumbnailError> {
        let (path, _temp) = self.input_path(video).await?;

        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(&path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ThumbnailError::Probe(format!("cannot run {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(ThumbnailError::Probe(format!("ffprobe failed for {}", video.name())));
        }

        let data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ThumbnailError::Probe(format!("invalid ffprobe output: {}", e)))?;
        let probe = parse_probe(&data)?;

        info!(
            "📹 Analyzed video: {} ({}x{}, {:.1}fps, {:.1}s)",
            video.name(),
            probe.width,
            probe.height,
            probe.frame_rate.unwrap_or(0.0),
            probe.duration.map(|d| d.as_secs_f64()).unwrap_or(0.0)
        );

        Ok(probe)
    }

    async fn sample(&self, video: &VideoFile, at: Duration) -> Result<ImageAsset, ThumbnailError> {
        let (path, _temp) = self.input_path(video).await?;
        let timestamp = format!("{:.3}", at.as_secs_f64());
        let quality = self.jpeg_quality.to_string();

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-ss", &timestamp, "-i"])
            .arg(&path)
            .args(["-frames:v", "1"]);
        if self.max_width > 0 {
            // Keep aspect ratio, never upscale
            cmd.arg("-vf").arg(format!("scale='min({},iw)':-2", self.max_width));
        }
        cmd.args(["-q:v", &quality, "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
            .kill_on_drop(true);

        debug!("Executing command: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| ThumbnailError::Sample(format!("cannot run {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ThumbnailError::Sample(format!(
                "ffmpeg failed at {}s: {}",
                timestamp,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(ThumbnailError::EmptyFrame);
        }

        Ok(ImageAsset::new("image/jpeg", output.stdout))
    }
}

/// Read duration, frame rate and size from `ffprobe -print_format json`
pub fn parse_probe(data: &serde_json::Value) -> Result<VideoProbe, ThumbnailError> {
    let streams = data["streams"]
        .as_array()
        .ok_or_else(|| ThumbnailError::Probe("no streams reported".to_string()))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| ThumbnailError::Probe("no video stream found".to_string()))?;

    let duration = data["format"]["duration"]
        .as_str()
        .or_else(|| video_stream["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(|d| Duration::try_from_secs_f64(d).ok());

    let frame_rate = video_stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_rate)
        .or_else(|| video_stream["r_frame_rate"].as_str().and_then(parse_rate));

    Ok(VideoProbe {
        duration,
        frame_rate,
        width: video_stream["width"].as_u64().unwrap_or(0) as u32,
        height: video_stream["height"].as_u64().unwrap_or(0) as u32,
    })
}

fn parse_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_probe() {
        let data = json!({
            "streams": [
                { "codec_type": "audio", "codec_name": "aac" },
                {
                    "codec_type": "video",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "30000/1001",
                    "r_frame_rate": "30/1"
                }
            ],
            "format": { "duration": "92.480000" }
        });

        let probe = parse_probe(&data).unwrap();
        assert_eq!(probe.width, 1920);
        assert_eq!(probe.height, 1080);
        assert!((probe.duration.unwrap().as_secs_f64() - 92.48).abs() < 1e-6);
        assert!((probe.frame_rate.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        let data = json!({ "streams": [{ "codec_type": "audio" }], "format": {} });
        assert!(matches!(parse_probe(&data), Err(ThumbnailError::Probe(_))));
    }

    #[test]
    fn test_parse_probe_unrepresentable_duration() {
        let data = json!({
            "streams": [{ "codec_type": "video", "avg_frame_rate": "1/100000000000000000000" }],
            "format": { "duration": "1e30" }
        });

        let probe = parse_probe(&data).unwrap();
        assert_eq!(probe.duration, None);
        assert_eq!(
            crate::thumbnail::sample_offset(&probe, Duration::from_secs(1), 30.0),
            Duration::ZERO
        );

        let data = json!({
            "streams": [{ "codec_type": "video", "avg_frame_rate": "1/100000000000000000000" }],
            "format": { "duration": "0.5" }
        });
        let probe = parse_probe(&data).unwrap();
        let offset = crate::thumbnail::sample_offset(&probe, Duration::from_secs(1), 25.0);
        assert_eq!(offset, Duration::from_millis(460));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("n/a"), None);
    }

    #[tokio::test]
    async fn test_in_memory_video_is_spooled_to_disk() {
        let sampler = FfmpegFrameSampler::new(&crate::config::Config::default().thumbnail);
        let video = VideoFile::new("porch.webm", "video/webm", vec![7u8; 64]);

        let (path, temp) = sampler.input_path(&video).await.unwrap();
        assert!(temp.is_some());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webm"));
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_stage_spools_in_memory_video_once() {
        let sampler = FfmpegFrameSampler::new(&crate::config::Config::default().thumbnail);
        let video = VideoFile::new("porch.mov", "video/quicktime", vec![3u8; 128]);

        let staged = sampler.stage(&video).await.unwrap().unwrap();
        assert_eq!(tokio::fs::read(staged.path()).await.unwrap().len(), 128);

        // A staged video is read from its file, nothing else is written
        let on_disk = video.with_source_path(staged.path());
        let (path, temp) = sampler.input_path(&on_disk).await.unwrap();
        assert!(temp.is_none());
        assert_eq!(path, staged.path());
        assert!(sampler.stage(&on_disk).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_probe_error() {
        let sampler = FfmpegFrameSampler::new(&crate::config::Config::default().thumbnail)
            .with_binaries("/nonexistent/ffprobe", "/nonexistent/ffmpeg");
        let video = VideoFile::new("porch.mp4", "video/mp4", vec![7u8; 64]);

        let err = sampler.probe(&video).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Probe(msg) if msg.contains("cannot run")));

        let err = sampler.sample(&video, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Sample(_)));
    }
}
