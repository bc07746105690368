//! In-process status store.
//!
//! Same contract as the PostgreSQL repository, kept in a sharded map. Used
//! by single-node deployments without a database and by the engine tests.

use async_trait::async_trait;
use dashmap::DashMap;

use statushub_core::error::AppError;
use statushub_core::result::AppResult;
use statushub_entity::status::{StatusRecord, UserStatus};

use crate::repositories::status::StatusStore;

/// Status store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    rows: DashMap<String, StatusRecord>,
}

impl MemoryStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, user_id: &str) -> AppResult<StatusRecord> {
        self.rows
            .get(user_id)
            .map(|row| row.value().clone())
            .ok_or_else(|| AppError::not_found(format!("No status for user {user_id}")))
    }

    async fn get_by_ids(&self, user_ids: &[String]) -> AppResult<Vec<StatusRecord>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| row.value().clone()))
            .collect())
    }

    async fn save_or_update(&self, status: &StatusRecord) -> AppResult<()> {
        status.validate()?;
        self.rows.insert(status.user_id.clone(), status.clone());
        Ok(())
    }

    async fn update_last_activity_at(&self, user_id: &str, last_activity_at: i64) -> AppResult<()> {
        if let Some(mut row) = self.rows.get_mut(user_id) {
            row.last_activity_at = last_activity_at;
        }
        Ok(())
    }

    async fn update_expired_dnd_statuses(&self, now: i64) -> AppResult<Vec<StatusRecord>> {
        let mut restored = Vec::new();
        // The check and the flip happen under the shard write lock, so a
        // concurrent sweep never sees the same row as expired.
        for mut row in self.rows.iter_mut() {
            if !row.is_dnd_expired(now) {
                continue;
            }
            let previous = row.previous_status.take();
            row.status = previous.unwrap_or(UserStatus::Offline);
            row.manual = false;
            row.dnd_end_time = None;
            restored.push(row.value().clone());
        }
        Ok(restored)
    }

    async fn delete(&self, user_id: &str) -> AppResult<()> {
        self.rows.remove(user_id);
        Ok(())
    }
}
