//! Message sink implementations

use super::{MessageSink, Notification};
use crate::config::NotificationConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Posts each notification as JSON to a webhook
#[derive(Clone, Debug)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
    timeout: Duration,
}

impl WebhookSink {
    /// Sink posting to `url`
    pub fn new(url: impl Into<String>, config: &NotificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            auth_header: config.auth_header.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl MessageSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .json(notification)
            .timeout(self.timeout);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        request.send().await?.error_for_status()?;
        tracing::debug!(owner_id = %notification.owner_id(), "notification delivered");
        Ok(())
    }
}

/// Writes notifications to the log; used when no webhook is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::Text { owner_id, text } => {
                tracing::info!(owner_id = %owner_id, "{text}");
            }
            Notification::Typing { owner_id } => {
                tracing::debug!(owner_id = %owner_id, "typing");
            }
            Notification::Choice {
                owner_id,
                text,
                options,
            } => {
                let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
                tracing::info!(owner_id = %owner_id, choices = ?labels, "{text}");
            }
        }
        Ok(())
    }
}
