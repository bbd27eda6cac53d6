//! Node-level error type.

use thiserror::Error;

/// Errors returned by a capability (subprocess, HTTP call, notification).
///
/// The engine does not distinguish between variants when retrying: every
/// error consumes one attempt. The variants exist so callers and logs can
/// tell *why* an attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The request was malformed before anything was dispatched
    /// (empty command, missing URL, bad HTTP method, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The process could not be started at all.
    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The process ran but exited unsuccessfully.
    #[error("'{command}' exited with {}: {output}", exit_label(.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// Transport-level HTTP failure (connect, TLS, body read).
    #[error("http request failed: {0}")]
    Http(String),

    /// The server answered with a 4xx/5xx status.
    #[error("http request returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The notification channel refused or could not deliver the message.
    #[error("notification failed: {0}")]
    Notification(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}
