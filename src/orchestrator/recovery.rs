//! Startup recovery

use crate::db::TaskStore;
use crate::error::Result;
use crate::poller::PollerHandle;

/// What startup recovery re-registered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Owners with at least one record
    pub owners: usize,
    /// Jobs handed to the poller
    pub jobs: usize,
}

/// Re-register every persisted job with the poller.
///
/// Submits nothing to the daemon. A storage failure is returned; corrupt
/// per-owner mappings were already reduced to empty ones by the store.
pub async fn recover(store: &TaskStore, poller: &PollerHandle) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    for (owner_id, tasks) in store.load_all().await? {
        if tasks.is_empty() {
            continue;
        }
        report.owners += 1;
        for (job_id, record) in tasks {
            tracing::debug!(
                owner_id = %owner_id,
                job_id = %job_id,
                task_id = %record.task_id,
                stage = %record.stage,
                "resuming watch"
            );
            poller.watch(owner_id.clone(), job_id);
            report.jobs += 1;
        }
    }
    Ok(report)
}
