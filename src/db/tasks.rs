//! Per-owner task record gateway.
//!
//! Every operation reads or rewrites an owner's whole mapping under a single
//! key. There is no locking here: callers serialize calls for the same owner.

use crate::Result;
use crate::types::{JobId, OwnerId, TaskMap, TaskRecord};
use std::sync::Arc;

use super::KeyValueStore;

/// Loads and saves owners' task mappings
#[derive(Clone)]
pub struct TaskStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TaskStore {
    /// Gateway over `kv`
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The owner's records.
    ///
    /// An absent or undecodable blob yields an empty mapping; only backend
    /// failures are errors.
    pub async fn load(&self, owner_id: &OwnerId) -> Result<TaskMap> {
        let Some(raw) = self.kv.get(owner_id.as_str().as_bytes()).await? else {
            return Ok(TaskMap::new());
        };
        Ok(decode_map(owner_id, &raw))
    }

    /// Overwrite the owner's full mapping. An empty mapping removes the key.
    pub async fn save(&self, owner_id: &OwnerId, tasks: &TaskMap) -> Result<()> {
        let key = owner_id.as_str().as_bytes();
        if tasks.is_empty() {
            return self.kv.delete(key).await;
        }
        let value = serde_json::to_vec(tasks)?;
        self.kv.set(key, &value).await
    }

    /// Insert or replace one record
    pub async fn put(&self, owner_id: &OwnerId, job_id: JobId, record: TaskRecord) -> Result<()> {
        let mut tasks = self.load(owner_id).await?;
        tasks.insert(job_id, record);
        self.save(owner_id, &tasks).await
    }

    /// Remove one record, returning it if it existed
    pub async fn delete(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<Option<TaskRecord>> {
        let mut tasks = self.load(owner_id).await?;
        let removed = tasks.remove(job_id);
        if removed.is_some() {
            self.save(owner_id, &tasks).await?;
        }
        Ok(removed)
    }

    /// Every owner's records; corrupt mappings are returned empty
    pub async fn load_all(&self) -> Result<Vec<(OwnerId, TaskMap)>> {
        let rows = self.kv.get_all().await?;
        let mut owners = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let owner_id = match String::from_utf8(key) {
                Ok(owner) => OwnerId::from(owner),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping non UTF-8 owner key");
                    continue;
                }
            };
            let tasks = decode_map(&owner_id, &value);
            owners.push((owner_id, tasks));
        }
        Ok(owners)
    }
}

fn decode_map(owner_id: &OwnerId, raw: &[u8]) -> TaskMap {
    match serde_json::from_slice(raw) {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::warn!(owner_id = %owner_id, error = %e, "corrupt task mapping, starting fresh");
            TaskMap::new()
        }
    }
}
