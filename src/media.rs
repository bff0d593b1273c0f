//! In-memory media handed between the upload steps

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::config::UploadConfig;
use crate::error::{Result, SubmissionError};

/// Video selected by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    name: String,
    mime_type: String,
    bytes: Bytes,
    source_path: Option<PathBuf>,
}

impl VideoFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            source_path: None,
        }
    }

    /// Read a video from disk, inferring its MIME type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(video_mime_for_extension)
            .unwrap_or("application/octet-stream");

        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            bytes: Bytes::from(bytes),
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Point the video at a file holding the same bytes
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check the video against the upload limits
    pub fn validate(&self, config: &UploadConfig) -> Result<()> {
        if self.is_empty() {
            return Err(SubmissionError::InvalidVideo("file is empty".to_string()));
        }

        if !self.mime_type.starts_with("video/") {
            let ext = Path::new(&self.name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());
            let supported = ext
                .as_ref()
                .map_or(false, |e| config.supported_extensions.contains(e));
            if !supported {
                return Err(SubmissionError::InvalidVideo(format!(
                    "unsupported type {}",
                    self.mime_type
                )));
            }
        }

        if config.max_video_bytes > 0 && self.size() > config.max_video_bytes {
            return Err(SubmissionError::InvalidVideo(format!(
                "{:.1} MB exceeds the {:.0} MB limit",
                self.size() as f64 / 1_048_576.0,
                config.max_video_bytes as f64 / 1_048_576.0
            )));
        }

        Ok(())
    }
}

/// Encoded image: a thumbnail or the processed depth artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    mime_type: String,
    bytes: Bytes,
}

impl ImageAsset {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build an asset, taking the MIME type from the file signature
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let mime_type = sniff_image_mime(&bytes).unwrap_or("application/octet-stream");
        Self::new(mime_type, bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the MIME type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    /// Encode as a `data:` URI for previews
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    /// Decode a base64 `data:` URI
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        let mime_type = if mime_type.is_empty() {
            sniff_image_mime(&bytes).unwrap_or("application/octet-stream")
        } else {
            mime_type
        };
        Some(Self::new(mime_type.to_string(), bytes))
    }

    /// File name used when the asset is sent as a multipart part
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

fn video_mime_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Identify common image formats by their magic bytes
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
