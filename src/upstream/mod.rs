//! Upstream media-album client
//!
//! Forwards a queued [`Entry`] as a `multipart/form-data` POST and parses the
//! album API's JSON answer.
//!
//! # Example
//!
//! ```no_run
//! use album_relay::config::UpstreamConfig;
//! use album_relay::queue::Entry;
//! use album_relay::upstream::{Forwarder, UpstreamClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = UpstreamConfig {
//!     endpoint: "https://album.example.com/api/upload".to_string(),
//!     api_key: "secret".to_string(),
//!     ..Default::default()
//! };
//! let client = UpstreamClient::new(&config)?;
//!
//! let response = client.forward(&Entry::new("cat.jpg", vec![0u8; 16])).await?;
//! println!("Uploaded as {}", response.name);
//! # Ok(())
//! # }
//! ```

use crate::config::UpstreamConfig;
use crate::queue::Entry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod multipart;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header carrying the target album identifier
pub const ALBUM_HEADER: &str = "albumuuid";

/// Forwarding errors
///
/// The worker decides what to do with each variant; none are fatal.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Client configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response status was {0}")]
    Status(u16),

    #[error("Error unmarshalling response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ForwardError::Decode(e.to_string())
        } else if e.is_builder() {
            ForwardError::ConfigError(e.to_string())
        } else {
            // Timeouts, connect failures and DNS errors all land here
            ForwardError::Transport(e.to_string())
        }
    }
}

/// Upstream answer to a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub name: String,
    pub uuid: String,
    pub url: String,
}

/// Something that can deliver an entry upstream
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, entry: &Entry) -> Result<UploadResponse, ForwardError>;
}

/// reqwest-backed album API client
pub struct UpstreamClient {
    endpoint: String,
    api_key: String,
    album: String,
    detect_content_type: bool,
    http_client: reqwest::Client,
}

impl UpstreamClient {
    /// Create a client with the configured request timeout
    pub fn new(config: &UpstreamConfig) -> Result<Self, ForwardError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ForwardError::ConfigError(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            album: config.album.clone(),
            detect_content_type: config.detect_content_type,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Forwarder for UpstreamClient {
    #[tracing::instrument(
        name = "upstream.forward",
        skip(self, entry),
        fields(
            entry.id = %entry.id,
            entry.name = %entry.name,
            upload.bytes = entry.len(),
            http.status_code = tracing::field::Empty
        )
    )]
    async fn forward(&self, entry: &Entry) -> Result<UploadResponse, ForwardError> {
        let form = multipart::build_form(entry, self.detect_content_type)?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ALBUM_HEADER, &self.album)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status != reqwest::StatusCode::OK {
            return Err(ForwardError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<UploadResponse>(&body).map_err(|e| ForwardError::Decode(e.to_string()))
    }
}
