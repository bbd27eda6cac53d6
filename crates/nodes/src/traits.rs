//! Capability traits: the contracts the engine dispatches steps through.
//!
//! Every side effect a workflow step can have flows through one of these
//! traits, so the engine can be exercised in tests with the doubles in
//! [`crate::mock`] instead of real processes and sockets.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::NodeError;

/// Per-invocation options for a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Variables set on top of the inherited process environment.
    pub env: HashMap<String, String>,
    /// Working directory; `None` inherits the caller's.
    pub working_dir: Option<PathBuf>,
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `name` with `args`, caring only about success.
    async fn run_cmd(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<(), NodeError>;

    /// Run `name` with `args` and return its captured standard output.
    async fn run_cmd_output(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<String, NodeError>;
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A successful (2xx/3xx) HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Issues HTTP requests.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    /// Send the request. Implementations map 4xx/5xx answers to
    /// [`NodeError::HttpStatus`].
    async fn call(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// Delivers a text message to a named channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, message: &str) -> Result<(), NodeError>;
}
