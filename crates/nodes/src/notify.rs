//! `ChannelNotifier`: routes notifications to logs or webhooks.
//!
//! Channel resolution, in order:
//! 1. `log` / `console`: emitted as a `tracing` event.
//! 2. A channel registered with [`ChannelNotifier::with_webhook`].
//! 3. A channel that is itself an `http(s)://` URL.
//!
//! Webhooks receive `{"text": "<message>"}` as a JSON `POST`, which is the
//! payload shape Slack-compatible incoming webhooks accept.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::{HttpCaller, HttpRequest, NodeError, Notifier};

pub struct ChannelNotifier {
    http: Arc<dyn HttpCaller>,
    webhooks: HashMap<String, String>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<dyn HttpCaller>) -> Self {
        Self {
            http,
            webhooks: HashMap::new(),
        }
    }

    /// Register a named channel that posts to `url`.
    pub fn with_webhook(mut self, channel: impl Into<String>, url: impl Into<String>) -> Self {
        self.webhooks.insert(channel.into(), url.into());
        self
    }

    fn resolve<'a>(&'a self, channel: &'a str) -> Option<&'a str> {
        if let Some(url) = self.webhooks.get(channel) {
            return Some(url.as_str());
        }
        if channel.starts_with("http://") || channel.starts_with("https://") {
            return Some(channel);
        }
        None
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel: &str, message: &str) -> Result<(), NodeError> {
        if matches!(channel, "log" | "console") {
            info!(channel, "notification: {message}");
            return Ok(());
        }

        let url = self
            .resolve(channel)
            .ok_or_else(|| NodeError::Notification(format!("unknown channel '{channel}'")))?;

        let request = HttpRequest::new("POST", url)
            .with_header("content-type", "application/json")
            .with_body(json!({ "text": message }).to_string());

        self.http
            .call(&request)
            .await
            .map(|_| ())
            .map_err(|e| NodeError::Notification(format!("channel '{channel}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttpCaller;

    #[tokio::test]
    async fn log_channel_needs_no_transport() {
        let http = Arc::new(MockHttpCaller::responding(200, ""));
        let notifier = ChannelNotifier::new(http.clone());

        notifier.notify("log", "deploy finished").await.unwrap();
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn registered_channel_posts_json_to_its_url() {
        let http = Arc::new(MockHttpCaller::responding(200, "ok"));
        let notifier = ChannelNotifier::new(http.clone())
            .with_webhook("slack", "https://hooks.example.com/T000");

        notifier.notify("slack", "build broke").await.unwrap();

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "https://hooks.example.com/T000");
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["text"], "build broke");
    }

    #[tokio::test]
    async fn url_channel_is_used_directly() {
        let http = Arc::new(MockHttpCaller::responding(204, ""));
        let notifier = ChannelNotifier::new(http.clone());

        notifier.notify("https://example.com/hook", "hi").await.unwrap();
        assert_eq!(http.requests()[0].url, "https://example.com/hook");
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let notifier = ChannelNotifier::new(Arc::new(MockHttpCaller::responding(200, "")));
        let err = notifier.notify("pager", "hi").await.unwrap_err();
        assert!(matches!(err, NodeError::Notification(msg) if msg.contains("pager")));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_as_notification_error() {
        let notifier = ChannelNotifier::new(Arc::new(MockHttpCaller::responding(500, "down")))
            .with_webhook("team", "https://example.com/team");
        let err = notifier.notify("team", "hi").await.unwrap_err();
        assert!(matches!(err, NodeError::Notification(_)));
    }
}
