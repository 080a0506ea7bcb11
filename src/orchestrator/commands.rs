//! Owner commands, executed on the lifecycle task between status events

use super::{Command, SubmitRequest, Submitted};
use crate::error::{DaemonError, Error, Result, TaskError};
use crate::types::{Category, Event, JobId, OwnerId, RetireReason, Stage, TaskMap, TaskRecord};
use crate::utils::{content_hash, display_name, find_magnet, render_active_report};

use super::lifecycle::LifecycleMachine;

impl LifecycleMachine {
    /// Run one command and answer its caller.
    ///
    /// A caller that stopped waiting does not undo the command.
    pub(crate) async fn execute(&self, command: Command) {
        match command {
            Command::Submit {
                owner_id,
                request,
                reply,
            } => {
                let _ = reply.send(self.submit(&owner_id, request).await);
            }
            Command::ChooseCategory {
                owner_id,
                job_id,
                category,
                reply,
            } => {
                let _ = reply.send(self.choose_category(&owner_id, &job_id, category).await);
            }
            Command::Cancel {
                owner_id,
                job_id,
                reply,
            } => {
                let _ = reply.send(self.cancel(&owner_id, &job_id).await);
            }
            Command::TellActive { owner_id, reply } => {
                let _ = reply.send(self.tell_active(owner_id.as_ref()).await);
            }
            Command::ListTasks { owner_id, reply } => {
                let _ = reply.send(self.list_tasks(&owner_id).await);
            }
        }
    }

    async fn submit(&self, owner_id: &OwnerId, request: SubmitRequest) -> Result<Submitted> {
        self.authorize(owner_id)?;

        let Some(locator) = find_magnet(&request.locator) else {
            self.notifier
                .text(owner_id, "Please send me a magnet link.");
            return Err(TaskError::MissingLocator.into());
        };

        let metadata_dir = &self.config.directories.metadata_dir;
        let job_id = match self.daemon.add_metadata(locator, metadata_dir).await {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, error = %e, "metadata submission failed");
                self.notifier.text(owner_id, e.to_string());
                return Err(e);
            }
        };

        let category = request
            .category
            .as_deref()
            .map(Category::parse)
            .unwrap_or_default();
        let record = TaskRecord::new(
            content_hash(locator),
            request.subdir,
            category,
            display_name(locator),
        );
        let task_id = record.task_id;

        if let Err(e) = self.store.put(owner_id, job_id.clone(), record).await {
            tracing::error!(
                owner_id = %owner_id,
                job_id = %job_id,
                error = %e,
                "metadata job submitted but its record was not saved"
            );
            self.notifier.text(owner_id, e.to_string());
            return Err(e);
        }

        self.poller.watch(owner_id.clone(), job_id.clone());
        tracing::info!(
            owner_id = %owner_id,
            job_id = %job_id,
            task_id = %task_id,
            category = %category,
            "metadata fetch started"
        );
        self.emit(Event::TaskCreated {
            owner_id: owner_id.clone(),
            job_id: job_id.clone(),
            task_id,
        });
        Ok(Submitted { job_id, task_id })
    }

    async fn choose_category(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        category: Category,
    ) -> Result<JobId> {
        self.authorize(owner_id)?;
        if !category.is_resolved() {
            return Err(TaskError::InvalidCategory(category.to_string()).into());
        }

        let mut record = self.owned_record(owner_id, job_id).await?;
        if record.stage != Stage::MetadataFetch {
            return Err(TaskError::InvalidStage {
                job_id: job_id.clone(),
                stage: record.stage,
                operation: "choose category for".to_string(),
            }
            .into());
        }

        tracing::info!(owner_id = %owner_id, job_id = %job_id, category = %category, "category chosen by owner");
        record.category = category;
        self.start_bulk_transfer(owner_id, job_id, record).await
    }

    async fn cancel(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<()> {
        self.authorize(owner_id)?;
        let record = self.owned_record(owner_id, job_id).await?;

        match self.daemon.remove(job_id).await {
            Ok(()) => {
                tracing::info!(owner_id = %owner_id, job_id = %job_id, "removal requested");
                // a record waiting for its category is not watched any more
                self.poller.watch(owner_id.clone(), job_id.clone());
                Ok(())
            }
            Err(Error::Daemon(DaemonError::Rpc { message, .. })) => {
                // the daemon no longer knows the job, nothing will report it removed
                tracing::info!(owner_id = %owner_id, job_id = %job_id, reason = %message, "job unknown to daemon, record dropped");
                self.notifier
                    .text(owner_id, format!("Task with ID {job_id} removed."));
                self.retire(owner_id, job_id, &record, RetireReason::Removed)
                    .await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, job_id = %job_id, error = %e, "removal failed");
                self.notifier.text(owner_id, e.to_string());
                Err(e)
            }
        }
    }

    async fn tell_active(&self, owner_id: Option<&OwnerId>) -> Result<String> {
        if let Some(owner_id) = owner_id {
            self.authorize(owner_id)?;
        }

        let report = match self.daemon.tell_active().await {
            Ok(active) => render_active_report(&active),
            Err(e) => {
                tracing::warn!(error = %e, "active job query failed");
                if let Some(owner_id) = owner_id {
                    self.notifier.text(owner_id, e.to_string());
                }
                return Err(e);
            }
        };

        if let Some(owner_id) = owner_id {
            self.notifier.text(owner_id, report.clone());
        }
        Ok(report)
    }

    async fn list_tasks(&self, owner_id: &OwnerId) -> Result<TaskMap> {
        self.authorize(owner_id)?;
        self.store.load(owner_id).await
    }

    /// The owner's record for `job_id`; tells the owner when there is none
    async fn owned_record(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<TaskRecord> {
        let tasks = self.store.load(owner_id).await?;
        match tasks.get(job_id) {
            Some(record) => Ok(record.clone()),
            None => {
                self.notifier
                    .text(owner_id, format!("You have no tasks with ID {job_id}."));
                Err(TaskError::NotFound {
                    owner_id: owner_id.clone(),
                    job_id: job_id.clone(),
                }
                .into())
            }
        }
    }
}
