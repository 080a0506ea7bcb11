//! SQLite key-value operations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, KeyValueStore};

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM owner_tasks WHERE owner_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read owner tasks: {}",
                    e
                )))
            })
    }

    async fn get_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
            "SELECT owner_key, value FROM owner_tasks ORDER BY owner_key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list owner tasks: {}",
                e
            )))
        })
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO owner_tasks (owner_key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(owner_key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write owner tasks: {}",
                e
            )))
        })?;

        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        sqlx::query("DELETE FROM owner_tasks WHERE owner_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete owner tasks: {}",
                    e
                )))
            })?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
