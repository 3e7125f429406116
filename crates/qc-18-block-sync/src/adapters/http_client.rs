//! # HTTP Node Client
//!
//! `NodeClient` speaking a peer's node API over HTTP.
//!
//! | Request | Endpoint |
//! |---------|----------|
//! | Block stream | `GET {endpoint}/blocks?height-range={start}-{end}&mode={mode}` |
//! | Node info | `GET {endpoint}/` |
//!
//! Response bodies are capped at `max_body` bytes, checked against the
//! declared `Content-Length` and again while the body streams in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use shared_types::{BlockMode, HeightRange, NodeInfo};

use crate::domain::{ClientError, DEFAULT_MAX_RESPONSE_BYTES};
use crate::ports::NodeClient;

/// reqwest-based node API client.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    endpoint: String,
    max_body: usize,
}

impl HttpNodeClient {
    /// Create a client for the node API at `endpoint`, bounding every
    /// request by `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let endpoint: String = endpoint.into();
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            max_body: DEFAULT_MAX_RESPONSE_BYTES,
        })
    }

    /// Replace the response body size limit.
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, url: &str) -> Result<Response, ClientError> {
        let response = self.client.get(url).send().await.map_err(map_error)?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            status => Err(ClientError::Status(status.as_u16())),
        }
    }

    async fn read_body(&self, mut response: Response) -> Result<String, ClientError> {
        let limit = self.max_body;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ClientError::BodyTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_error)? {
            if body.len() + chunk.len() > limit {
                return Err(ClientError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        String::from_utf8(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn map_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_decode() {
        ClientError::Decode(e.to_string())
    } else {
        ClientError::Transport(e.to_string())
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_blocks(&self, range: HeightRange, mode: BlockMode) -> Result<String, ClientError> {
        let url = format!("{}/blocks?height-range={}&mode={}", self.endpoint, range, mode);
        let response = self.get(&url).await?;
        self.read_body(response).await
    }

    async fn node_info(&self) -> Result<NodeInfo, ClientError> {
        let url = format!("{}/", self.endpoint);
        let response = self.get(&url).await?;
        let body = self.read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
