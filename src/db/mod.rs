//! Persistence for aria-pilot
//!
//! Task records are stored per owner: one key (the owner id) holds the whole
//! serialized `job id -> record` mapping of that owner.
//!
//! ## Submodules
//!
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`kv`] - [`KeyValueStore`] implementation on SQLite
//! - [`tasks`] - [`TaskStore`], the per-owner record gateway

use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

mod kv;
mod migrations;
mod tasks;

pub use tasks::TaskStore;

/// Byte-keyed blob storage backing the task store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, `None` when absent
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Every stored key/value pair
    async fn get_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Release the backend; later calls fail
    async fn close(&self);
}

/// SQLite database handle
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}
