//! Push notification dispatch.
//!
//! When a verdict flags a call, a notification is published to a topic equal
//! to the connection's identity, so only the paired handset receives it. The
//! body depends on the risk label: the two recognized caution labels get the
//! milder advisory, everything else gets the strong end-the-call warning.
//!
//! Publish failures are logged by the caller and dropped; they are never
//! retried and never affect clip processing.

use crate::defaults;
use crate::error::{CallguardError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// A composed notification ready for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// Composes the notification body for a risk label.
///
/// Unrecognized labels (including empty ones) deliberately fall through to
/// the strong warning: an unknown risk stage is treated as high risk.
pub fn compose_body(risk_level: &str) -> String {
    if defaults::CAUTION_LABELS.contains(&risk_level) {
        format!("{risk_level}\n{}", defaults::CAUTION_BODY)
    } else {
        format!("{risk_level}\n{}", defaults::WARNING_BODY)
    }
}

/// Trait for topic-addressed notification publishing.
///
/// This trait allows swapping implementations (real push gateway vs mock).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a notification to the topic matching a device identity.
    async fn publish(&self, topic: &str, message: &PushMessage) -> Result<()>;
}

#[derive(Serialize)]
struct TopicPublish<'a> {
    to: String,
    notification: NotificationBody<'a>,
}

#[derive(Serialize)]
struct NotificationBody<'a> {
    title: &'a str,
    body: &'a str,
}

/// Push gateway client publishing over HTTP.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    /// Creates a notifier that posts to `endpoint` with the given client.
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, topic: &str, message: &PushMessage) -> Result<()> {
        let request = TopicPublish {
            to: format!("/topics/{topic}"),
            notification: NotificationBody {
                title: &message.title,
                body: &message.body,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallguardError::Publish {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallguardError::Publish {
                message: format!("gateway returned {status}"),
            });
        }

        Ok(())
    }
}

/// Mock notifier for testing
#[derive(Clone, Default)]
pub struct MockNotifier {
    published: std::sync::Arc<std::sync::Mutex<Vec<(String, PushMessage)>>>,
    should_fail: bool,
    event_log: Option<std::sync::Arc<std::sync::Mutex<Vec<String>>>>,
}

impl MockNotifier {
    /// Create a new mock notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on publish
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Record each publish into a log shared with other mocks, for ordering
    /// assertions across the pipeline
    pub fn with_event_log(
        mut self,
        log: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    ) -> Self {
        self.event_log = Some(log);
        self
    }

    /// All `(topic, message)` pairs published so far, in call order
    pub fn published(&self) -> Vec<(String, PushMessage)> {
        self.published.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn publish(&self, topic: &str, message: &PushMessage) -> Result<()> {
        self.published
            .lock()
            .expect("mock lock poisoned")
            .push((topic.to_string(), message.clone()));
        if let Some(log) = &self.event_log {
            log.lock().expect("mock lock poisoned").push("publish".to_string());
        }

        if self.should_fail {
            Err(CallguardError::Publish {
                message: "mock publish failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
