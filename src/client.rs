//! Clients for the external depth-analysis and description services

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{Result, SubmissionError};
use crate::media::{sniff_image_mime, ImageAsset, VideoFile};

/// Remote endpoints consumed by the upload flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    DepthAnalysis,
    Description,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::DepthAnalysis => f.write_str("depth-analysis"),
            Endpoint::Description => f.write_str("description"),
        }
    }
}

/// Trait for the processing backend
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Send the thumbnail, receive the processed image
    async fn analyze_depth(&self, thumbnail: &ImageAsset) -> Result<ImageAsset>;

    /// Send the video, receive its generated description
    async fn describe(&self, video: &VideoFile) -> Result<String>;
}

/// HTTP implementation of [`ProcessingService`]
pub struct HttpProcessingService {
    config: ServiceConfig,
    client: reqwest::Client,
    depth_url: Url,
    describe_url: Url,
}

impl HttpProcessingService {
    pub fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow!("Processing service base URL not configured"))?;
        let base = normalize_base_url(base_url)?;
        let depth_url = base.join(config.depth_path.trim_start_matches('/'))?;
        let describe_url = base.join(config.describe_path.trim_start_matches('/'))?;

        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            config,
            client,
            depth_url,
            describe_url,
        })
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> &Url {
        match endpoint {
            Endpoint::DepthAnalysis => &self.depth_url,
            Endpoint::Description => &self.describe_url,
        }
    }

    async fn post_part(&self, endpoint: Endpoint, field: &str, part: Part) -> Result<reqwest::Response> {
        let url = self.endpoint_url(endpoint).clone();
        let form = Form::new().part(field.to_string(), part);

        debug!("Sending {} request to {}", endpoint, url);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("{} service error {}: {}", endpoint, status, truncate(&text, 200));
            return Err(SubmissionError::RemoteService {
                endpoint,
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ProcessingService for HttpProcessingService {
    async fn analyze_depth(&self, thumbnail: &ImageAsset) -> Result<ImageAsset> {
        let part = file_part(thumbnail.bytes(), thumbnail.file_name("thumbnail"), thumbnail.mime_type());
        let response = self
            .post_part(Endpoint::DepthAnalysis, &self.config.image_field, part)
            .await?;

        let content_type = media_type(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(Endpoint::DepthAnalysis, e))?;

        decode_depth_body(content_type.as_deref(), body)
    }

    async fn describe(&self, video: &VideoFile) -> Result<String> {
        let part = file_part(video.bytes(), video.name().to_string(), video.mime_type());
        let response = self
            .post_part(Endpoint::Description, &self.config.video_field, part)
            .await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(Endpoint::Description, e))?;

        decode_description(&body, &self.config.description_field)
    }
}

/// Interpret a depth-analysis response body as an image
pub fn decode_depth_body(content_type: Option<&str>, body: Bytes) -> Result<ImageAsset> {
    let decode_error = |message: String| SubmissionError::Decode {
        endpoint: Endpoint::DepthAnalysis,
        message,
    };

    if body.is_empty() {
        return Err(decode_error("empty response body".to_string()));
    }

    if let Some(ct) = content_type {
        if ct.starts_with("image/") {
            return Ok(ImageAsset::new(ct.to_string(), body));
        }
        if ct == "application/json" || ct.ends_with("+json") || ct.starts_with("text/") {
            return Err(decode_error(format!("expected an image, got {}", ct)));
        }
    }

    match sniff_image_mime(&body) {
        Some(mime) => Ok(ImageAsset::new(mime, body)),
        None => Err(decode_error("response is not a recognized image".to_string())),
    }
}

/// Extract the description text from a JSON response body
pub fn decode_description(body: &[u8], field: &str) -> Result<String> {
    let decode_error = |message: String| SubmissionError::Decode {
        endpoint: Endpoint::Description,
        message,
    };

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| decode_error(format!("invalid JSON: {}", e)))?;

    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| decode_error(format!("missing text field `{}`", field)))
}

fn normalize_base_url(base_url: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn file_part(bytes: &Bytes, file_name: String, mime: &str) -> Part {
    let make = || {
        Part::stream_with_length(reqwest::Body::from(bytes.clone()), bytes.len() as u64)
            .file_name(file_name.clone())
    };
    make().mime_str(mime).unwrap_or_else(|_| make())
}

fn media_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn network_error(endpoint: Endpoint, e: reqwest::Error) -> SubmissionError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("cannot connect: {}", e)
    } else {
        e.to_string()
    };
    SubmissionError::Network { endpoint, message }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
