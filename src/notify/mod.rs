//! Owner notifications and their delivery outbox
//!
//! The orchestrator produces three kinds of messages for owners: plain text,
//! a "typing" indicator and a text with category choices. They are queued to a
//! single delivery worker, which keeps their order, retries transient sink
//! failures with backoff and dead-letters what still cannot be delivered.

mod sink;

pub use sink::{LogSink, WebhookSink};

use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry::with_retry;
use crate::types::{Category, Event, JobId, OwnerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Message addressed to an owner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Plain text
    Text {
        /// Recipient
        owner_id: OwnerId,
        /// Message body
        text: String,
    },
    /// Lightweight "work in progress" indicator
    Typing {
        /// Recipient
        owner_id: OwnerId,
    },
    /// Text with a set of choices the owner can answer with
    Choice {
        /// Recipient
        owner_id: OwnerId,
        /// Prompt
        text: String,
        /// Offered answers
        options: Vec<ChoiceOption>,
    },
}

/// One answer offered by a [`Notification::Choice`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Button label
    pub label: String,
    /// Category chosen by this answer
    pub category: Category,
    /// Job the answer applies to
    pub job_id: JobId,
}

impl Notification {
    /// Plain text message
    pub fn text(owner_id: OwnerId, text: impl Into<String>) -> Self {
        Notification::Text {
            owner_id,
            text: text.into(),
        }
    }

    /// Prompt offering every resolvable category for `job_id`
    pub fn category_choice(owner_id: OwnerId, job_id: &JobId, text: impl Into<String>) -> Self {
        let options = Category::CHOICES
            .iter()
            .map(|category| ChoiceOption {
                label: category.as_str().to_string(),
                category: *category,
                job_id: job_id.clone(),
            })
            .collect();
        Notification::Choice {
            owner_id,
            text: text.into(),
            options,
        }
    }

    /// Recipient
    pub fn owner_id(&self) -> &OwnerId {
        match self {
            Notification::Text { owner_id, .. }
            | Notification::Typing { owner_id }
            | Notification::Choice { owner_id, .. } => owner_id,
        }
    }
}

/// Transport that hands notifications to the messaging layer
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Deliver one notification
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Handle to the notification outbox
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    /// Start the delivery worker for `sink`.
    ///
    /// The worker exits once every `Notifier` clone is dropped and the queue
    /// is drained.
    pub fn spawn(
        sink: Arc<dyn MessageSink>,
        retry: RetryConfig,
        events: broadcast::Sender<Event>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dropped = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(deliver_all(sink, retry, rx, events, dropped.clone()));
        (Self { tx, dropped }, worker)
    }

    /// Queue a notification
    pub fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::warn!("notification worker stopped, message discarded");
        }
    }

    /// Queue a plain text message
    pub fn text(&self, owner_id: &OwnerId, text: impl Into<String>) {
        self.send(Notification::text(owner_id.clone(), text));
    }

    /// Number of notifications given up on since start
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn deliver_all(
    sink: Arc<dyn MessageSink>,
    retry: RetryConfig,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    events: broadcast::Sender<Event>,
    dropped: Arc<AtomicU64>,
) {
    while let Some(notification) = rx.recv().await {
        let result = with_retry(&retry, || sink.deliver(&notification)).await;
        if let Err(e) = result {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                sink = sink.name(),
                owner_id = %notification.owner_id(),
                error = %e,
                "notification dead-lettered"
            );
            events
                .send(Event::NotificationDropped {
                    owner_id: notification.owner_id().clone(),
                    error: e.to_string(),
                })
                .ok();
        }
    }
}
