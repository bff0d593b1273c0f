use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the memory room uploader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote processing service settings
    pub service: ServiceConfig,

    /// Thumbnail extraction settings
    pub thumbnail: ThumbnailConfig,

    /// Upload validation settings
    pub upload: UploadConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the processing service (no default, the prototype host changes)
    pub base_url: Option<String>,

    /// Path of the depth-analysis endpoint, relative to the base URL
    pub depth_path: String,

    /// Path of the description endpoint, relative to the base URL
    pub describe_path: String,

    /// Multipart field carrying the thumbnail image
    pub image_field: String,

    /// Multipart field carrying the video
    pub video_field: String,

    /// JSON field holding the generated description
    pub description_field: String,

    /// Timeout for each request in seconds (None = wait indefinitely)
    pub request_timeout_seconds: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,

    /// How the two service calls are scheduled
    pub strategy: SubmitStrategy,
}

/// Scheduling of the depth-analysis and description calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubmitStrategy {
    /// Issue both calls at once and join on both outcomes
    Concurrent,
    /// Depth-analysis first; the description call only runs if it succeeded
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Playback offset to sample, in seconds
    pub offset_seconds: f64,

    /// Upper bound for the whole probe + seek + sample chain, in seconds
    pub timeout_seconds: u64,

    /// Frame rate assumed when the container does not report one
    pub fallback_fps: f64,

    /// FFmpeg JPEG quality scale (2 = high, 31 = low)
    pub jpeg_quality: u8,

    /// Maximum thumbnail width in pixels (0 = keep source width)
    pub max_width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Supported video file extensions
    pub supported_extensions: Vec<String>,

    /// Maximum video size in bytes (0 = no limit)
    pub max_video_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the processed image and description
    pub base_dir: PathBuf,

    /// Write a JSON summary next to the artifacts
    pub save_summary: bool,
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl ThumbnailConfig {
    pub fn offset(&self) -> Duration {
        Duration::try_from_secs_f64(self.offset_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "xperi3d-upload.toml",
            "config/xperi3d-upload.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                match Self::from_file(Path::new(path)) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        // Try environment variables
        Self::from_env()
    }

    /// Load configuration from a specific TOML file, then apply env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&config_str)?;
        config.apply_env();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var("XPERI3D_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.service.base_url = Some(base_url);
            }
        }

        if let Ok(timeout) = std::env::var("XPERI3D_REQUEST_TIMEOUT") {
            if let Ok(seconds) = timeout.parse() {
                self.service.request_timeout_seconds = Some(seconds);
            }
        }

        if let Ok(output_dir) = std::env::var("XPERI3D_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = self
            .service
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow!("service.base_url must be configured"))?;

        let parsed = url::Url::parse(base_url)
            .map_err(|e| anyhow!("service.base_url is not a valid URL ({}): {}", base_url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("service.base_url must use http or https"));
        }

        if self.service.depth_path.trim().is_empty() || self.service.describe_path.trim().is_empty() {
            return Err(anyhow!("endpoint paths must not be empty"));
        }

        if self.service.image_field.is_empty()
            || self.service.video_field.is_empty()
            || self.service.description_field.is_empty()
        {
            return Err(anyhow!("payload field names must not be empty"));
        }

        if Duration::try_from_secs_f64(self.thumbnail.offset_seconds).is_err() {
            return Err(anyhow!("thumbnail.offset_seconds must be a non-negative number"));
        }

        if self.thumbnail.timeout_seconds == 0 {
            return Err(anyhow!("thumbnail.timeout_seconds must be greater than 0"));
        }

        if !(self.thumbnail.fallback_fps.is_finite() && self.thumbnail.fallback_fps > 0.0) {
            return Err(anyhow!("thumbnail.fallback_fps must be greater than 0"));
        }

        if !(2..=31).contains(&self.thumbnail.jpeg_quality) {
            return Err(anyhow!("thumbnail.jpeg_quality must be between 2 and 31"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Memory Room Uploader Configuration:\n\
            - Service: {}\n\
            - Depth Endpoint: {}\n\
            - Describe Endpoint: {}\n\
            - Strategy: {:?}\n\
            - Request Timeout: {}\n\
            - Thumbnail Offset: {:.1}s\n\
            - Output Directory: {}",
            self.service.base_url.as_deref().unwrap_or("<unset>"),
            self.service.depth_path,
            self.service.describe_path,
            self.service.strategy,
            self.service
                .request_timeout_seconds
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "none".to_string()),
            self.thumbnail.offset_seconds,
            self.output.base_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                base_url: None,
                depth_path: "getdepth".to_string(),
                describe_path: "describe".to_string(),
                image_field: "image".to_string(),
                video_field: "video".to_string(),
                description_field: "description".to_string(),
                request_timeout_seconds: Some(600), // 10 minutes, video analysis is slow
                connect_timeout_seconds: 30,
                strategy: SubmitStrategy::Concurrent,
            },
            thumbnail: ThumbnailConfig {
                offset_seconds: 1.0,
                timeout_seconds: 30,
                fallback_fps: 30.0,
                jpeg_quality: 3,
                max_width: 1280,
            },
            upload: UploadConfig {
                supported_extensions: vec![
                    "mp4".to_string(),
                    "mkv".to_string(),
                    "avi".to_string(),
                    "mov".to_string(),
                    "webm".to_string(),
                    "m4v".to_string(),
                ],
                max_video_bytes: 500 * 1024 * 1024,
            },
            output: OutputConfig {
                base_dir: PathBuf::from("./output"),
                save_summary: true,
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.service.base_url = Some(base_url.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SubmitStrategy) -> Self {
        self.config.service.strategy = strategy;
        self
    }

    pub fn with_request_timeout(mut self, seconds: Option<u64>) -> Self {
        self.config.service.request_timeout_seconds = seconds;
        self
    }

    pub fn with_thumbnail_offset(mut self, seconds: f64) -> Self {
        self.config.thumbnail.offset_seconds = seconds;
        self
    }

    pub fn with_thumbnail_timeout(mut self, seconds: u64) -> Self {
        self.config.thumbnail.timeout_seconds = seconds;
        self
    }

    pub fn with_max_video_bytes(mut self, bytes: u64) -> Self {
        self.config.upload.max_video_bytes = bytes;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
