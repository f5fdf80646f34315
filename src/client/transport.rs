//! Outbound transport for gated requests.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::Result;

/// A serialized request ready to be sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// JSON body
    pub body: String,
    /// Bearer token sent in the `Authorization` header
    pub bearer: String,
}

/// What the remote service answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for delivering a request to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse>;
}

/// HTTP transport posting JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Create a transport from client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.endpoint.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        debug!(endpoint = %self.endpoint, bytes = request.body.len(), "Posting request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", request.bearer))
            .timeout(self.timeout)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Transport that only logs requests and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        info!(bytes = request.body.len(), "Dry run, request not sent");
        Ok(TransportResponse {
            status: 200,
            body: String::new(),
        })
    }
}
