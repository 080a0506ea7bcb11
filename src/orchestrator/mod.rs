//! Orchestrator: wiring plus the serial lifecycle task
//!
//! [`Orchestrator`] is a cheap, cloneable handle. All task record reads and
//! writes happen on one spawned task that drains the status event stream and
//! the owner command channel in turn, so transitions never race each other.
//!
//! ## Submodules
//!
//! - `lifecycle` - stage transitions driven by status events
//! - `commands` - owner commands (submit, choose category, cancel, reports)
//! - `recovery` - re-registering persisted jobs at startup

mod commands;
mod lifecycle;
mod recovery;

pub use recovery::{RecoveryReport, recover};

use crate::classifier::{Classifier, HttpClassifier};
use crate::config::Config;
use crate::daemon::{Aria2Client, DownloadDaemon};
use crate::db::{Database, KeyValueStore, TaskStore};
use crate::error::{Error, Result};
use crate::notify::{LogSink, MessageSink, Notifier, WebhookSink};
use crate::poller::{PollerHandle, spawn_status_poller};
use crate::types::{Category, Event, JobId, OwnerId, StatusEvent, TaskId, TaskMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use lifecycle::LifecycleMachine;

/// Capacity of the status event stream between poller and lifecycle task
const STATUS_BUFFER: usize = 256;

/// Capacity of the owner command channel
const COMMAND_BUFFER: usize = 64;

/// External collaborators the orchestrator drives
#[derive(Clone)]
pub struct Components {
    /// Download daemon control interface
    pub daemon: Arc<dyn DownloadDaemon>,
    /// Classification gateway
    pub classifier: Arc<dyn Classifier>,
    /// Storage backend for task records
    pub kv: Arc<dyn KeyValueStore>,
    /// Where owner notifications go
    pub sink: Arc<dyn MessageSink>,
}

/// A new download as requested by an owner
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Free text containing a magnet locator
    pub locator: String,
    /// Destination subdirectory under the category root
    #[serde(default)]
    pub subdir: String,
    /// Category name; when it resolves, the classifier is skipped
    #[serde(default)]
    pub category: Option<String>,
}

/// Identifiers of an accepted submission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Submitted {
    /// Metadata job id
    pub job_id: JobId,
    /// Logical task id
    pub task_id: TaskId,
}

pub(crate) enum Command {
    Submit {
        owner_id: OwnerId,
        request: SubmitRequest,
        reply: oneshot::Sender<Result<Submitted>>,
    },
    ChooseCategory {
        owner_id: OwnerId,
        job_id: JobId,
        category: Category,
        reply: oneshot::Sender<Result<JobId>>,
    },
    Cancel {
        owner_id: OwnerId,
        job_id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },
    TellActive {
        owner_id: Option<OwnerId>,
        reply: oneshot::Sender<Result<String>>,
    },
    ListTasks {
        owner_id: OwnerId,
        reply: oneshot::Sender<Result<TaskMap>>,
    },
}

/// Handle to a running orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    commands: mpsc::Sender<Command>,
    poller: PollerHandle,
    event_tx: broadcast::Sender<Event>,
    notifier: Notifier,
    kv: Arc<dyn KeyValueStore>,
    config: Arc<Config>,
}

impl Orchestrator {
    /// Connect to the daemon, open the database and start every task.
    ///
    /// Fails when the configuration is invalid, the daemon cannot be reached
    /// or the database cannot be opened.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let daemon = Arc::new(Aria2Client::new(&config.daemon));
        let version = daemon.version().await.inspect_err(|e| {
            tracing::error!(rpc_url = %config.daemon.rpc_url, error = %e, "download daemon unreachable");
        })?;
        tracing::info!(version = %version, rpc_url = %config.daemon.rpc_url, "connected to aria2");

        let db = Database::new(&config.persistence.database_path).await?;
        let classifier = HttpClassifier::new(&config.classifier);
        let sink: Arc<dyn MessageSink> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone(), &config.notifications)),
            None => Arc::new(LogSink),
        };

        Self::with_components(
            config,
            Components {
                daemon,
                classifier: Arc::new(classifier),
                kv: Arc::new(db),
                sink,
            },
        )
        .await
    }

    /// Start the orchestrator over the given collaborators.
    ///
    /// Persisted jobs are re-registered with the poller before the first
    /// status event or owner command is processed.
    pub async fn with_components(config: Config, components: Components) -> Result<Self> {
        let config = Arc::new(config);
        let (event_tx, _rx) = broadcast::channel(1000);

        let (notifier, _delivery) = Notifier::spawn(
            components.sink.clone(),
            config.notifications.retry.clone(),
            event_tx.clone(),
        );
        tracing::debug!(sink = components.sink.name(), "notification outbox started");

        let (poller, statuses, _polling) = spawn_status_poller(
            components.daemon.clone(),
            config.daemon.effective_polling_interval(),
            STATUS_BUFFER,
        );

        let store = TaskStore::new(components.kv.clone());
        let report = recover(&store, &poller).await?;
        tracing::info!(owners = report.owners, jobs = report.jobs, "recovered persisted tasks");

        let machine = LifecycleMachine {
            daemon: components.daemon,
            classifier: components.classifier,
            store,
            poller: poller.clone(),
            notifier: notifier.clone(),
            events: event_tx.clone(),
            config: config.clone(),
        };
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run(machine, statuses, command_rx));

        Ok(Self {
            commands,
            poller,
            event_tx,
            notifier,
            kv: components.kv,
            config,
        })
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration the orchestrator runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Notifications given up on since start
    pub fn dropped_notifications(&self) -> u64 {
        self.notifier.dropped_count()
    }

    /// Start watching a job directly, bypassing submission
    pub fn watch(&self, owner_id: OwnerId, job_id: JobId) -> bool {
        self.poller.watch(owner_id, job_id)
    }

    /// Submit a magnet locator for `owner_id`
    pub async fn submit(&self, owner_id: OwnerId, request: SubmitRequest) -> Result<Submitted> {
        self.request(|reply| Command::Submit {
            owner_id,
            request,
            reply,
        })
        .await
    }

    /// Resume a task waiting for its category; returns the bulk transfer job id
    pub async fn choose_category(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        category: Category,
    ) -> Result<JobId> {
        self.request(|reply| Command::ChooseCategory {
            owner_id,
            job_id,
            category,
            reply,
        })
        .await
    }

    /// Ask the daemon to remove one of the owner's jobs
    pub async fn cancel(&self, owner_id: OwnerId, job_id: JobId) -> Result<()> {
        self.request(|reply| Command::Cancel {
            owner_id,
            job_id,
            reply,
        })
        .await
    }

    /// Report of the daemon's active jobs.
    ///
    /// With an owner, the owner must be authorized and also receives the report.
    pub async fn tell_active(&self, owner_id: Option<OwnerId>) -> Result<String> {
        self.request(|reply| Command::TellActive { owner_id, reply })
            .await
    }

    /// The owner's persisted task records
    pub async fn list_tasks(&self, owner_id: OwnerId) -> Result<TaskMap> {
        self.request(|reply| Command::ListTasks { owner_id, reply })
            .await
    }

    /// Release the storage backend. Later commands touching records fail.
    pub async fn close(&self) {
        self.kv.close().await;
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)?
    }
}

/// Serial consumer of status events and owner commands
async fn run(
    machine: LifecycleMachine,
    mut statuses: mpsc::Receiver<StatusEvent>,
    mut commands: mpsc::Receiver<Command>,
) {
    tracing::info!("lifecycle task started");
    loop {
        tokio::select! {
            Some(event) = statuses.recv() => machine.handle_status(event).await,
            Some(command) = commands.recv() => machine.execute(command).await,
            else => break,
        }
    }
    tracing::info!("lifecycle task stopped");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
