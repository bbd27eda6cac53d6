//! Test doubles for the capability traits.
//!
//! Useful in unit and integration tests where spawning real processes or
//! opening sockets is either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    CommandOptions, CommandRunner, HttpCaller, HttpRequest, HttpResponse, NodeError, Notifier,
};

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockRunner` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with the given captured output.
    Output(String),
    /// Always exit unsuccessfully with the given message.
    Fail(String),
    /// Fail the first `failures` calls of a command, then succeed with `output`.
    FailTimes { failures: usize, output: String },
    /// Never finish; only cancellation or a timeout ends the call.
    Hang,
}

/// A single invocation seen by a `MockRunner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub name: String,
    pub args: Vec<String>,
    pub options: CommandOptions,
}

/// A mock command runner that records every call it receives and behaves
/// as programmed, optionally per command name.
#[derive(Debug, Clone)]
pub struct MockRunner {
    default: MockBehaviour,
    per_command: HashMap<String, MockBehaviour>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockRunner {
    pub fn new(default: MockBehaviour) -> Self {
        Self {
            default,
            per_command: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A runner on which every command succeeds with `output`.
    pub fn succeeding(output: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Output(output.into()))
    }

    /// A runner on which every command fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Fail(message.into()))
    }

    /// A runner on which every command hangs forever.
    pub fn hanging() -> Self {
        Self::new(MockBehaviour::Hang)
    }

    /// Override the behaviour for one command name.
    pub fn with_command(mut self, name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.per_command.insert(name.into(), behaviour);
        self
    }

    /// Number of commands this runner has been asked to run.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of times `name` has been run.
    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.name == name).count()
    }

    /// All invocations in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<String, NodeError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                name: name.to_owned(),
                args: args.to_vec(),
                options: options.clone(),
            });
            calls.iter().filter(|c| c.name == name).count()
        };

        match self.per_command.get(name).unwrap_or(&self.default) {
            MockBehaviour::Output(output) => Ok(output.clone()),
            MockBehaviour::Fail(message) => Err(NodeError::NonZeroExit {
                command: name.to_owned(),
                code: Some(1),
                output: message.clone(),
            }),
            MockBehaviour::FailTimes { failures, output } => {
                if seen <= *failures {
                    Err(NodeError::NonZeroExit {
                        command: name.to_owned(),
                        code: Some(1),
                        output: format!("transient failure {seen}/{failures}"),
                    })
                } else {
                    Ok(output.clone())
                }
            }
            MockBehaviour::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run_cmd(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<(), NodeError> {
        self.respond(name, args, options).await.map(|_| ())
    }

    async fn run_cmd_output(
        &self,
        name: &str,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<String, NodeError> {
        self.respond(name, args, options).await
    }
}

// ---------------------------------------------------------------------------
// MockHttpCaller
// ---------------------------------------------------------------------------

/// Answers every request with a fixed status and body.
#[derive(Debug, Clone)]
pub struct MockHttpCaller {
    status: u16,
    body: String,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockHttpCaller {
    pub fn responding(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpCaller for MockHttpCaller {
    async fn call(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.status >= 400 {
            return Err(NodeError::HttpStatus {
                status: self.status,
                body: self.body.clone(),
            });
        }
        Ok(HttpResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Records `(channel, message)` pairs; optionally refuses delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    refuse: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails (the attempt is still recorded).
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &str, message: &str) -> Result<(), NodeError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_owned(), message.to_owned()));
        if self.refuse {
            return Err(NodeError::Notification(format!("channel '{channel}' refused delivery")));
        }
        Ok(())
    }
}
