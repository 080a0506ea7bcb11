//! Lifecycle state machine
//!
//! `MetadataFetch -> BulkTransfer -> Seeding -> (deleted)`, with `error` and
//! `removed` daemon statuses retiring a record from any stage.

use crate::classifier::Classifier;
use crate::config::Config;
use crate::daemon::DownloadDaemon;
use crate::db::TaskStore;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};
use crate::poller::PollerHandle;
use crate::types::{
    DaemonStatus, Event, JobId, OwnerId, RetireReason, Stage, StatusEvent, TaskRecord,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Owns every task record transition. Only the serial lifecycle task holds one.
pub(crate) struct LifecycleMachine {
    pub(crate) daemon: Arc<dyn DownloadDaemon>,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) store: TaskStore,
    pub(crate) poller: PollerHandle,
    pub(crate) notifier: Notifier,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
}

impl LifecycleMachine {
    /// Apply one status event to the matching record
    pub(crate) async fn handle_status(&self, event: StatusEvent) {
        let owner_id = &event.owner_id;
        let job_id = &event.job_id;

        let tasks = match self.store.load(owner_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, job_id = %job_id, error = %e, "cannot load tasks, event skipped");
                return;
            }
        };
        let Some(mut record) = tasks.get(job_id).cloned() else {
            tracing::debug!(owner_id = %owner_id, job_id = %job_id, "no record for job, event ignored");
            return;
        };

        match event.status {
            DaemonStatus::Error => {
                self.notifier.text(
                    owner_id,
                    format!("Download of '{}' failed! {}", record.label(), event.error_message),
                );
                self.retire(owner_id, job_id, &record, RetireReason::Errored)
                    .await;
                return;
            }
            DaemonStatus::Removed => {
                self.notifier
                    .text(owner_id, format!("Task with ID {job_id} removed."));
                self.retire(owner_id, job_id, &record, RetireReason::Removed)
                    .await;
                return;
            }
            _ => {}
        }

        if record.stage == Stage::MetadataFetch {
            if event.status == DaemonStatus::Active {
                self.notifier.send(Notification::Typing {
                    owner_id: owner_id.clone(),
                });
            }
            if event.is_complete() {
                self.metadata_complete(&event, record).await;
            }
            return;
        }

        if record.stage == Stage::BulkTransfer {
            if !event.reported_name.is_empty() && event.reported_name != record.display_name {
                record.display_name = event.reported_name.clone();
                record.touch();
                match self.store.put(owner_id, job_id.clone(), record.clone()).await {
                    Ok(()) => self.emit(Event::DisplayNameUpdated {
                        owner_id: owner_id.clone(),
                        job_id: job_id.clone(),
                        name: record.display_name.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(owner_id = %owner_id, job_id = %job_id, error = %e, "display name not saved");
                    }
                }
            }

            if event.is_complete() {
                record.stage = Stage::Seeding;
                record.touch();
                if let Err(e) = self.store.put(owner_id, job_id.clone(), record.clone()).await {
                    tracing::error!(owner_id = %owner_id, job_id = %job_id, error = %e, "seeding stage not saved");
                    self.advance_failed(owner_id, job_id, &e);
                    return;
                }
                tracing::info!(owner_id = %owner_id, job_id = %job_id, task_id = %record.task_id, "transfer complete, seeding");
                self.emit(Event::StageChanged {
                    owner_id: owner_id.clone(),
                    job_id: job_id.clone(),
                    task_id: record.task_id,
                    stage: Stage::Seeding,
                });
                self.notifier.text(
                    owner_id,
                    format!(
                        "Download of '{}' to '{}' category is complete!",
                        record.label(),
                        record.category
                    ),
                );
            }
        }

        if record.stage == Stage::Seeding {
            if event.status == DaemonStatus::Complete {
                tracing::info!(owner_id = %owner_id, job_id = %job_id, task_id = %record.task_id, "seeding finished");
                self.retire(owner_id, job_id, &record, RetireReason::Completed)
                    .await;
            } else if event.unwatched {
                // dropped on byte count while still seeding; wait for the daemon's complete
                self.poller.watch(owner_id.clone(), job_id.clone());
            }
        }
    }

    /// Classify the fetched metadata (unless the category is known) and move on
    async fn metadata_complete(&self, event: &StatusEvent, mut record: TaskRecord) {
        let owner_id = &event.owner_id;
        let job_id = &event.job_id;

        let mut filled = false;
        if record.content_hash.is_empty() && !event.infohash.is_empty() {
            record.content_hash = event.infohash.to_lowercase();
            filled = true;
        }
        if record.display_name.is_empty() && !event.reported_name.is_empty() {
            record.display_name = event.reported_name.clone();
            filled = true;
        }

        if !record.category.is_resolved() {
            let artifact = self.config.directories.artifact_path(&record.content_hash);
            let threshold = self.config.classifier.threshold();

            let confident = match self.classifier.classify(&artifact).await {
                Ok(prediction) => {
                    let percent = prediction.confidence_percent();
                    let category = prediction.category();
                    tracing::info!(
                        owner_id = %owner_id,
                        job_id = %job_id,
                        label = %prediction.label,
                        confidence = percent,
                        threshold,
                        "classified metadata"
                    );
                    (category.is_resolved() && prediction.reaches(threshold))
                        .then_some((category, percent))
                }
                Err(e) => {
                    tracing::warn!(owner_id = %owner_id, job_id = %job_id, error = %e, "classification failed");
                    None
                }
            };

            let Some((category, percent)) = confident else {
                if filled {
                    record.touch();
                    if let Err(e) = self.store.put(owner_id, job_id.clone(), record.clone()).await {
                        tracing::warn!(owner_id = %owner_id, job_id = %job_id, error = %e, "metadata details not saved");
                    }
                }
                self.notifier.send(Notification::category_choice(
                    owner_id.clone(),
                    job_id,
                    format!(
                        "I'm not sure about category of '{}'. Could you please select it yourself?",
                        record.label()
                    ),
                ));
                self.emit(Event::AwaitingCategory {
                    owner_id: owner_id.clone(),
                    job_id: job_id.clone(),
                });
                return;
            };

            record.category = category;
            self.notifier.text(
                owner_id,
                format!(
                    "Download category of '{}' is '{}', I'm {}% sure",
                    record.label(),
                    category,
                    percent
                ),
            );
        }

        // failures were already reported to the owner
        let _ = self.start_bulk_transfer(owner_id, job_id, record).await;
    }

    /// Submit the bulk transfer for `record` and re-key it to the new job.
    ///
    /// On failure the stored record is left as it was and the new job (if any)
    /// is not watched.
    pub(crate) async fn start_bulk_transfer(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        mut record: TaskRecord,
    ) -> Result<JobId> {
        let directories = &self.config.directories;
        let artifact_path = directories.artifact_path(&record.content_hash);
        let destination = directories.destination(record.category, &record.target_subdir);

        let submitted = async {
            let artifact = tokio::fs::read(&artifact_path).await?;
            tokio::fs::create_dir_all(&destination).await?;
            self.daemon.add_artifact(&artifact, &destination).await
        }
        .await;
        let new_job = match submitted {
            Ok(new_job) => new_job,
            Err(e) => {
                tracing::warn!(
                    owner_id = %owner_id,
                    job_id = %job_id,
                    artifact = %artifact_path.display(),
                    error = %e,
                    "bulk transfer submission failed"
                );
                self.advance_failed(owner_id, job_id, &e);
                return Err(e);
            }
        };

        record.stage = Stage::BulkTransfer;
        record.touch();
        let persisted = async {
            let mut tasks = self.store.load(owner_id).await?;
            tasks.remove(job_id);
            tasks.insert(new_job.clone(), record.clone());
            self.store.save(owner_id, &tasks).await
        }
        .await;
        if let Err(e) = persisted {
            tracing::error!(
                owner_id = %owner_id,
                job_id = %job_id,
                new_job_id = %new_job,
                error = %e,
                "bulk job submitted but its record was not saved, daemon job left unwatched"
            );
            self.advance_failed(owner_id, job_id, &e);
            return Err(e);
        }

        self.poller.watch(owner_id.clone(), new_job.clone());
        tracing::info!(
            owner_id = %owner_id,
            job_id = %new_job,
            previous_job_id = %job_id,
            task_id = %record.task_id,
            category = %record.category,
            destination = %destination.display(),
            "bulk transfer started"
        );
        self.emit(Event::StageChanged {
            owner_id: owner_id.clone(),
            job_id: new_job.clone(),
            task_id: record.task_id,
            stage: Stage::BulkTransfer,
        });
        self.notifier.text(
            owner_id,
            format!(
                "Download of '{}' to '{}' category started.",
                record.label(),
                record.category
            ),
        );
        Ok(new_job)
    }

    /// Delete the record and announce why
    pub(crate) async fn retire(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        record: &TaskRecord,
        reason: RetireReason,
    ) {
        match self.store.delete(owner_id, job_id).await {
            Ok(_) => {
                tracing::info!(owner_id = %owner_id, job_id = %job_id, task_id = %record.task_id, reason = ?reason, "task retired");
                self.emit(Event::TaskRetired {
                    owner_id: owner_id.clone(),
                    job_id: job_id.clone(),
                    task_id: record.task_id,
                    reason,
                });
            }
            Err(e) => {
                tracing::error!(owner_id = %owner_id, job_id = %job_id, error = %e, "failed to delete retired task");
            }
        }
    }

    fn advance_failed(&self, owner_id: &OwnerId, job_id: &JobId, error: &Error) {
        self.notifier.text(owner_id, error.to_string());
        self.emit(Event::AdvanceFailed {
            owner_id: owner_id.clone(),
            job_id: job_id.clone(),
            error: error.to_string(),
        });
    }

    pub(crate) fn emit(&self, event: Event) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn authorize(&self, owner_id: &OwnerId) -> Result<()> {
        if self.config.is_authorized(owner_id) {
            return Ok(());
        }
        tracing::warn!(owner_id = %owner_id, "unauthorized owner");
        self.notifier
            .text(owner_id, "You are not authorized to use this service.");
        Err(crate::error::TaskError::Unauthorized {
            owner_id: owner_id.clone(),
        }
        .into())
    }
}

