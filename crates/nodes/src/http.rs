//! `ReqwestCaller`: the production [`HttpCaller`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::{HttpCaller, HttpRequest, HttpResponse, NodeError};

/// Default per-request timeout applied by the underlying client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestCaller {
    client: reqwest::Client,
}

impl ReqwestCaller {
    /// Build a caller with the default timeout and user agent.
    pub fn new() -> Result<Self, NodeError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("runbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NodeError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpCaller for ReqwestCaller {
    async fn call(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError> {
        let method: reqwest::Method = request
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| NodeError::InvalidRequest(format!("invalid HTTP method: {}", request.method)))?;

        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| NodeError::InvalidRequest(format!("invalid URL '{}': {e}", request.url)))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NodeError::Http(format!("request to '{}' failed: {e}", request.url)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Http(format!("failed to read response body: {e}")))?;

        info!(url = request.url.as_str(), status, body_len = body.len(), "HTTP request completed");

        if status >= 400 {
            return Err(NodeError::HttpStatus { status, body });
        }
        Ok(HttpResponse { status, body })
    }
}
