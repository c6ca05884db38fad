//! Slack Webhook Notifier
//!
//! Posts the unprotected load balancer list to every configured webhook.
//!
//! Per target:
//! - connection-level failure: wait, retry, give up after the attempt limit
//! - HTTP 200: delivered
//! - any other status: rejected, never retried
//!
//! One target's failure never stops delivery to the next.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Status a webhook must return for delivery to count
pub const SUCCESS_STATUS: u16 = 200;

const MESSAGE_HEADER: &str = "Following LBs have no WAF associated.";

/// Connection-level delivery failure (retryable)
#[derive(Debug, Error)]
#[error("webhook transport error: {0}")]
pub struct TransportError(pub String);

/// What the endpoint answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one JSON payload to one URL
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<WebhookResponse, TransportError>;
}

#[async_trait]
impl<T: WebhookTransport + ?Sized> WebhookTransport for Arc<T> {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<WebhookResponse, TransportError> {
        self.as_ref().post(url, payload).await
    }
}

/// reqwest-backed transport for Slack incoming webhooks
pub struct SlackWebhook {
    client: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for SlackWebhook {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<WebhookResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(WebhookResponse { status, body })
    }
}

/// Bounded retry for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Terminal state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum DeliveryState {
    Delivered,
    Rejected { status: u16 },
    Abandoned,
}

/// Per-target delivery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub target: String,
    pub state: DeliveryState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl NotificationOutcome {
    pub fn delivered(&self) -> bool {
        self.state == DeliveryState::Delivered
    }
}

/// Render the alert text, one code-formatted identifier per line
pub fn format_message(unprotected: &BTreeSet<String>) -> String {
    let mut text = format!("{}\n", MESSAGE_HEADER);
    for arn in unprotected {
        text.push_str(&format!("*`{}`*\n", arn));
    }
    text
}

/// Delivers alerts through a [`WebhookTransport`]
pub struct Notifier<T: WebhookTransport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: WebhookTransport> Notifier<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Notify every target about the unprotected set
    ///
    /// Nothing is sent when the set is empty.
    pub async fn notify(
        &self,
        targets: &[String],
        unprotected: &BTreeSet<String>,
    ) -> Vec<NotificationOutcome> {
        if unprotected.is_empty() {
            info!("No text to push to slack.");
            return Vec::new();
        }

        let payload = json!({ "text": format_message(unprotected) });

        let mut outcomes = Vec::with_capacity(targets.len());
        for url in targets {
            outcomes.push(self.deliver(url, &payload).await);
        }
        outcomes
    }

    async fn deliver(&self, url: &str, payload: &serde_json::Value) -> NotificationOutcome {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.retry.max_attempts {
            attempts += 1;
            match self.transport.post(url, payload).await {
                Ok(response) if response.status == SUCCESS_STATUS => {
                    info!(attempts, "Pushed message to slack successfully.");
                    return NotificationOutcome {
                        target: url.to_string(),
                        state: DeliveryState::Delivered,
                        attempts,
                        last_error,
                    };
                }
                Ok(response) => {
                    warn!(
                        status = response.status,
                        body = %response.body,
                        "Could not push message to slack"
                    );
                    return NotificationOutcome {
                        target: url.to_string(),
                        state: DeliveryState::Rejected {
                            status: response.status,
                        },
                        attempts,
                        last_error: Some(format!("HTTP {}: {}", response.status, response.body)),
                    };
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempts < self.retry.max_attempts {
                        warn!(
                            attempt = attempts,
                            error = %e,
                            "Could not send slack request. Retrying after {} secs...",
                            self.retry.backoff.as_secs()
                        );
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        warn!(attempts, "Giving up on slack webhook");
        NotificationOutcome {
            target: url.to_string(),
            state: DeliveryState::Abandoned,
            attempts,
            last_error,
        }
    }
}
