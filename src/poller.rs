//! Status poller
//!
//! One task owns the watch set (`job id -> owner`). Other components can only
//! offer new entries through a [`PollerHandle`]; they never read or remove
//! entries. On every tick the poller issues one batched status query for all
//! watched jobs and forwards one [`StatusEvent`] per job on the event stream.
//! A job leaves the watch set as a side effect of emitting its terminal event.
//!
//! Ticks come from a separate timer task through a channel of capacity one, so
//! a tick that fires while a poll is still running is dropped, never queued.

use crate::daemon::{DownloadDaemon, StatusEntry};
use crate::types::{DaemonStatus, JobId, OwnerId, StatusEvent, sizes_complete};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Request to start watching a job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Owner the job belongs to
    pub owner_id: OwnerId,
    /// Daemon job id
    pub job_id: JobId,
}

/// Sending half of the registration channel
#[derive(Clone, Debug)]
pub struct PollerHandle {
    tx: mpsc::UnboundedSender<Registration>,
}

impl PollerHandle {
    /// Ask the poller to watch `job_id` for `owner_id`.
    ///
    /// Never blocks. Returns false only when the poller is gone.
    pub fn watch(&self, owner_id: OwnerId, job_id: JobId) -> bool {
        let sent = self.tx.send(Registration { owner_id, job_id }).is_ok();
        if !sent {
            tracing::warn!("status poller stopped, registration dropped");
        }
        sent
    }
}

/// Create a registration channel not yet attached to a running poller
pub(crate) fn registration_channel() -> (PollerHandle, mpsc::UnboundedReceiver<Registration>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PollerHandle { tx }, rx)
}

/// Watch set plus the daemon session used to poll it
pub struct StatusPoller {
    daemon: Arc<dyn DownloadDaemon>,
    watched: HashMap<JobId, OwnerId>,
}

impl StatusPoller {
    /// Poller with an empty watch set
    pub fn new(daemon: Arc<dyn DownloadDaemon>) -> Self {
        Self {
            daemon,
            watched: HashMap::new(),
        }
    }

    /// Add a job to the watch set; a repeated job id keeps the latest owner
    pub fn register(&mut self, registration: Registration) {
        let Registration { owner_id, job_id } = registration;
        if let Some(previous) = self.watched.insert(job_id.clone(), owner_id.clone())
            && previous != owner_id
        {
            tracing::warn!(
                job_id = %job_id,
                previous_owner = %previous,
                owner_id = %owner_id,
                "job re-registered for a different owner"
            );
        }
    }

    /// Number of watched jobs
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    /// Whether nothing is watched
    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Whether `job_id` is in the watch set
    pub fn is_watching(&self, job_id: &JobId) -> bool {
        self.watched.contains_key(job_id)
    }

    /// Run one poll cycle.
    ///
    /// A failed batch request abandons the cycle: no events, watch set unchanged.
    pub async fn poll_once(&mut self) -> Vec<StatusEvent> {
        if self.watched.is_empty() {
            return Vec::new();
        }

        let mut job_ids: Vec<JobId> = self.watched.keys().cloned().collect();
        job_ids.sort();
        tracing::debug!(jobs = job_ids.len(), "polling daemon");

        let entries = match self.daemon.tell_status_batch(&job_ids).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, jobs = job_ids.len(), "poll cycle abandoned");
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            let (job_id, mut event) = match entry {
                StatusEntry::Failed { job_id, message } => {
                    let event = StatusEvent {
                        owner_id: OwnerId::default(),
                        job_id: job_id.clone(),
                        infohash: String::new(),
                        status: DaemonStatus::Error,
                        error_message: message,
                        completed_bytes: 0,
                        total_bytes: 0,
                        reported_name: String::new(),
                        unwatched: true,
                    };
                    (job_id, event)
                }
                StatusEntry::Reported(status) => {
                    let unwatched = status.status.is_terminal()
                        || sizes_complete(status.completed_length, status.total_length);
                    let event = StatusEvent {
                        owner_id: OwnerId::default(),
                        job_id: status.gid.clone(),
                        infohash: status.info_hash.clone(),
                        status: status.status,
                        error_message: status.error_message.clone(),
                        completed_bytes: status.completed_length,
                        total_bytes: status.total_length,
                        reported_name: status.name().to_string(),
                        unwatched,
                    };
                    (status.gid, event)
                }
            };

            let owner_id = if event.unwatched {
                self.watched.remove(&job_id)
            } else {
                self.watched.get(&job_id).cloned()
            };
            let Some(owner_id) = owner_id else {
                tracing::debug!(job_id = %job_id, "status for a job that is not watched, skipped");
                continue;
            };
            if event.unwatched {
                tracing::debug!(job_id = %job_id, status = ?event.status, "job unregistered");
            }

            event.owner_id = owner_id;
            events.push(event);
        }
        events
    }
}

/// Spawn the poller loop and its tick timer.
///
/// Returns the registration handle, the receiving end of the status event
/// stream (bounded by `buffer`) and the loop's join handle. The loop ends when
/// the event receiver is dropped.
pub fn spawn_status_poller(
    daemon: Arc<dyn DownloadDaemon>,
    interval: Duration,
    buffer: usize,
) -> (PollerHandle, mpsc::Receiver<StatusEvent>, JoinHandle<()>) {
    let (handle, registrations) = registration_channel();
    let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
    let poller = StatusPoller::new(daemon);
    let task = tokio::spawn(run_poller(poller, registrations, event_tx, interval));
    (handle, event_rx, task)
}

async fn run_poller(
    mut poller: StatusPoller,
    mut registrations: mpsc::UnboundedReceiver<Registration>,
    events: mpsc::Sender<StatusEvent>,
    interval: Duration,
) {
    let (tick_tx, mut ticks) = mpsc::channel::<()>(1);
    let ticker = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately
        timer.tick().await;
        loop {
            timer.tick().await;
            match tick_tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                Err(mpsc::error::TrySendError::Closed(())) => break,
            }
        }
    });

    tracing::info!(interval_secs = interval.as_secs_f64(), "status poller started");

    loop {
        // registrations queued during a poll join the very next batch
        tokio::select! {
            biased;
            registration = registrations.recv() => match registration {
                Some(registration) => poller.register(registration),
                // every handle is gone, keep polling what is already watched
                None => {
                    while ticks.recv().await.is_some() {
                        if !emit(&mut poller, &events).await {
                            break;
                        }
                    }
                    break;
                }
            },
            Some(()) = ticks.recv() => {
                if !emit(&mut poller, &events).await {
                    break;
                }
            }
        }
    }

    ticker.abort();
    tracing::info!("status poller stopped");
}

/// Poll once and forward the events; false when the consumer is gone
async fn emit(poller: &mut StatusPoller, events: &mpsc::Sender<StatusEvent>) -> bool {
    for event in poller.poll_once().await {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}
