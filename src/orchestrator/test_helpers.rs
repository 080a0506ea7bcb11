//! Shared test doubles for driving the lifecycle without a daemon.

use super::lifecycle::LifecycleMachine;
use crate::classifier::{Classifier, Prediction};
use crate::config::{Config, RetryConfig};
use crate::daemon::{DownloadDaemon, JobStatus, StatusEntry};
use crate::db::{KeyValueStore, TaskStore};
use crate::error::{DaemonError, Error, Result};
use crate::notify::{MessageSink, Notification, Notifier};
use crate::poller::{Registration, registration_channel};
use crate::types::{DaemonStatus, Event, JobId, OwnerId, StatusEvent, TaskRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

/// Calls the orchestrator made on the daemon
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DaemonCall {
    AddMetadata { locator: String, dir: PathBuf },
    AddArtifact { bytes: Vec<u8>, dir: PathBuf },
    Remove(JobId),
    TellActive,
    TellStatus(Vec<JobId>),
}

/// Daemon double: hands out sequential job ids and answers status queries
/// from a per-job table.
#[derive(Default)]
pub(crate) struct MockDaemon {
    pub(crate) calls: Mutex<Vec<DaemonCall>>,
    pub(crate) statuses: Mutex<HashMap<JobId, StatusEntry>>,
    pub(crate) active: Mutex<Vec<JobStatus>>,
    pub(crate) fail_add_artifact: AtomicBool,
    pub(crate) fail_add_metadata: AtomicBool,
    pub(crate) remove_unknown: AtomicBool,
    next_job: AtomicU64,
}

impl MockDaemon {
    pub(crate) fn calls(&self) -> Vec<DaemonCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn submissions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    DaemonCall::AddMetadata { .. } | DaemonCall::AddArtifact { .. }
                )
            })
            .count()
    }

    /// Report `job_id` with the given status and byte counts from now on
    pub(crate) fn set_status(&self, job_id: &str, status: DaemonStatus, completed: u64, total: u64) {
        let mut report = JobStatus::new(JobId::from(job_id));
        report.status = status;
        report.completed_length = completed;
        report.total_length = total;
        self.statuses
            .lock()
            .unwrap()
            .insert(JobId::from(job_id), StatusEntry::Reported(report));
    }

    fn next_id(&self, prefix: &str) -> JobId {
        let n = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        JobId::from(format!("{prefix}{n}"))
    }
}

#[async_trait]
impl DownloadDaemon for MockDaemon {
    async fn version(&self) -> Result<String> {
        Ok("1.37.0".to_string())
    }

    async fn add_metadata(&self, locator: &str, dir: &Path) -> Result<JobId> {
        self.calls.lock().unwrap().push(DaemonCall::AddMetadata {
            locator: locator.to_string(),
            dir: dir.to_path_buf(),
        });
        if self.fail_add_metadata.load(Ordering::SeqCst) {
            return Err(Error::Daemon(DaemonError::Rpc {
                code: 1,
                message: "metadata rejected".into(),
            }));
        }
        Ok(self.next_id("meta"))
    }

    async fn add_artifact(&self, artifact: &[u8], dir: &Path) -> Result<JobId> {
        self.calls.lock().unwrap().push(DaemonCall::AddArtifact {
            bytes: artifact.to_vec(),
            dir: dir.to_path_buf(),
        });
        if self.fail_add_artifact.load(Ordering::SeqCst) {
            return Err(Error::Daemon(DaemonError::Rpc {
                code: 1,
                message: "torrent rejected".into(),
            }));
        }
        Ok(self.next_id("bulk"))
    }

    async fn remove(&self, job_id: &JobId) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DaemonCall::Remove(job_id.clone()));
        if self.remove_unknown.load(Ordering::SeqCst) {
            return Err(Error::Daemon(DaemonError::Rpc {
                code: 1,
                message: format!("GID {job_id} is not found"),
            }));
        }
        Ok(())
    }

    async fn tell_active(&self) -> Result<Vec<JobStatus>> {
        self.calls.lock().unwrap().push(DaemonCall::TellActive);
        Ok(self.active.lock().unwrap().clone())
    }

    async fn tell_status_batch(&self, job_ids: &[JobId]) -> Result<Vec<StatusEntry>> {
        self.calls
            .lock()
            .unwrap()
            .push(DaemonCall::TellStatus(job_ids.to_vec()));
        let statuses = self.statuses.lock().unwrap();
        Ok(job_ids
            .iter()
            .map(|job_id| {
                statuses.get(job_id).cloned().unwrap_or_else(|| {
                    let mut waiting = JobStatus::new(job_id.clone());
                    waiting.status = DaemonStatus::Waiting;
                    StatusEntry::Reported(waiting)
                })
            })
            .collect())
    }
}

/// Classifier double answering from a script
#[derive(Default)]
pub(crate) struct MockClassifier {
    pub(crate) answers: Mutex<VecDeque<Result<Prediction>>>,
    pub(crate) calls: Mutex<Vec<PathBuf>>,
}

impl MockClassifier {
    pub(crate) fn answer(&self, label: &str, confidence: f32) {
        self.answers.lock().unwrap().push_back(Ok(Prediction {
            label: label.to_string(),
            confidence,
        }));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(Error::Classifier(message.to_string())));
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, artifact: &Path) -> Result<Prediction> {
        self.calls.lock().unwrap().push(artifact.to_path_buf());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Classifier("no answer scripted".into())))
    }
}

/// Sink keeping every delivered notification
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::Text { text, .. } | Notification::Choice { text, .. } => {
                    Some(text.clone())
                }
                Notification::Typing { .. } => None,
            })
            .collect()
    }

    pub(crate) fn all(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    /// Wait until at least `count` notifications arrived
    pub(crate) async fn wait_for(&self, count: usize) -> Vec<Notification> {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.delivered.lock().unwrap().len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "expected {count} notifications, got {:?}", self.all());
        self.all()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// In-memory key-value store that can be told to fail writes
#[derive(Default)]
pub(crate) struct MemoryKv {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    pub(crate) fail_writes: AtomicBool,
}

impl MemoryKv {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn get_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn close(&self) {}
}

/// Config rooted in `dir` with fast, single-attempt notification delivery
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.directories.series = dir.join("series");
    config.directories.movies = dir.join("movies");
    config.directories.general = dir.join("general");
    config.directories.metadata_dir = dir.join("metadata");
    config.daemon.polling_interval = Duration::from_millis(20);
    config.notifications.retry = RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    std::fs::create_dir_all(&config.directories.metadata_dir).unwrap();
    config
}

/// A lifecycle machine over test doubles, with its outputs exposed
pub(crate) struct Harness {
    pub(crate) machine: LifecycleMachine,
    pub(crate) daemon: Arc<MockDaemon>,
    pub(crate) classifier: Arc<MockClassifier>,
    pub(crate) kv: Arc<MemoryKv>,
    pub(crate) sink: Arc<RecordingSink>,
    pub(crate) registrations: mpsc::UnboundedReceiver<Registration>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) dir: TempDir,
}

/// Build a [`Harness`]; must run inside a tokio runtime
pub(crate) fn harness() -> Harness {
    harness_with(|_| {})
}

pub(crate) fn harness_with(configure: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let daemon = Arc::new(MockDaemon::default());
    let classifier = Arc::new(MockClassifier::default());
    let kv = Arc::new(MemoryKv::default());
    let sink = Arc::new(RecordingSink::default());

    let (event_tx, events) = broadcast::channel(100);
    let (notifier, _worker) = Notifier::spawn(
        sink.clone(),
        config.notifications.retry.clone(),
        event_tx.clone(),
    );
    let (poller, registrations) = registration_channel();

    let machine = LifecycleMachine {
        daemon: daemon.clone(),
        classifier: classifier.clone(),
        store: TaskStore::new(kv.clone()),
        poller,
        notifier,
        events: event_tx,
        config: Arc::new(config),
    };

    Harness {
        machine,
        daemon,
        classifier,
        kv,
        sink,
        registrations,
        events,
        dir,
    }
}

impl Harness {
    pub(crate) fn store(&self) -> &TaskStore {
        &self.machine.store
    }

    pub(crate) async fn seed(&self, owner: &str, job: &str, record: TaskRecord) {
        self.store()
            .put(&OwnerId::from(owner), JobId::from(job), record)
            .await
            .unwrap();
    }

    pub(crate) async fn record(&self, owner: &str, job: &str) -> Option<TaskRecord> {
        self.store()
            .load(&OwnerId::from(owner))
            .await
            .unwrap()
            .get(&JobId::from(job))
            .cloned()
    }

    /// Place a metadata artifact where the daemon would have saved it
    pub(crate) fn write_artifact(&self, content_hash: &str, bytes: &[u8]) {
        let path = self
            .machine
            .config
            .directories
            .artifact_path(content_hash);
        std::fs::write(path, bytes).unwrap();
    }

    pub(crate) fn drain_registrations(&mut self) -> Vec<Registration> {
        let mut out = Vec::new();
        while let Ok(registration) = self.registrations.try_recv() {
            out.push(registration);
        }
        out
    }

    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Status event as the poller would emit it
pub(crate) fn status_event(
    owner: &str,
    job: &str,
    status: DaemonStatus,
    completed: u64,
    total: u64,
) -> StatusEvent {
    StatusEvent {
        owner_id: OwnerId::from(owner),
        job_id: JobId::from(job),
        infohash: String::new(),
        status,
        error_message: String::new(),
        completed_bytes: completed,
        total_bytes: total,
        reported_name: String::new(),
        unwatched: status.is_terminal() || crate::types::sizes_complete(completed, total),
    }
}
