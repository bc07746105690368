//! Status store contract and its PostgreSQL implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use statushub_core::error::{AppError, ErrorKind};
use statushub_core::result::AppResult;
use statushub_entity::status::StatusRecord;

/// Durable persistence for the last known status of every user.
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait StatusStore: Send + Sync + std::fmt::Debug {
    /// Find one user's record. A missing row is `ErrorKind::NotFound`.
    async fn get(&self, user_id: &str) -> AppResult<StatusRecord>;

    /// Find the records of several users. Unknown IDs are simply absent.
    async fn get_by_ids(&self, user_ids: &[String]) -> AppResult<Vec<StatusRecord>>;

    /// Insert or fully overwrite a record.
    async fn save_or_update(&self, status: &StatusRecord) -> AppResult<()>;

    /// Touch only the activity column, without reading the row first.
    async fn update_last_activity_at(&self, user_id: &str, last_activity_at: i64) -> AppResult<()>;

    /// Restore every timed DND whose deadline is at or before `now` and
    /// return the restored records.
    ///
    /// Each expired row is returned by exactly one concurrent caller.
    async fn update_expired_dnd_statuses(&self, now: i64) -> AppResult<Vec<StatusRecord>>;

    /// Delete a user's record. Deleting an absent record is not an error.
    async fn delete(&self, user_id: &str) -> AppResult<()>;
}

/// PostgreSQL-backed status store.
#[derive(Debug, Clone)]
pub struct StatusRepository {
    pool: PgPool,
}

impl StatusRepository {
    /// Create a new status repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for StatusRepository {
    async fn get(&self, user_id: &str) -> AppResult<StatusRecord> {
        sqlx::query_as::<_, StatusRecord>("SELECT * FROM status WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find status", e))?
            .ok_or_else(|| AppError::not_found(format!("No status for user {user_id}")))
    }

    async fn get_by_ids(&self, user_ids: &[String]) -> AppResult<Vec<StatusRecord>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, StatusRecord>("SELECT * FROM status WHERE user_id = ANY($1)")
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find statuses by IDs", e)
            })
    }

    async fn save_or_update(&self, status: &StatusRecord) -> AppResult<()> {
        status.validate()?;
        sqlx::query(
            "INSERT INTO status \
             (user_id, status, manual, last_activity_at, active_channel, previous_status, dnd_end_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO UPDATE SET \
             status = EXCLUDED.status, manual = EXCLUDED.manual, \
             last_activity_at = EXCLUDED.last_activity_at, \
             active_channel = EXCLUDED.active_channel, \
             previous_status = EXCLUDED.previous_status, \
             dnd_end_time = EXCLUDED.dnd_end_time",
        )
        .bind(&status.user_id)
        .bind(status.status)
        .bind(status.manual)
        .bind(status.last_activity_at)
        .bind(&status.active_channel)
        .bind(status.previous_status)
        .bind(status.dnd_end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to save status", e))?;
        Ok(())
    }

    async fn update_last_activity_at(&self, user_id: &str, last_activity_at: i64) -> AppResult<()> {
        sqlx::query("UPDATE status SET last_activity_at = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(last_activity_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update last activity", e)
            })?;
        Ok(())
    }

    async fn update_expired_dnd_statuses(&self, now: i64) -> AppResult<Vec<StatusRecord>> {
        // Row locks make a concurrent sweep re-check the WHERE clause and
        // skip rows another node already restored.
        sqlx::query_as::<_, StatusRecord>(
            "UPDATE status SET \
             status = COALESCE(previous_status, 'offline'::user_status), \
             manual = FALSE, previous_status = NULL, dnd_end_time = NULL \
             WHERE status = 'dnd' AND manual AND dnd_end_time IS NOT NULL AND dnd_end_time <= $1 \
             RETURNING *",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to expire DND statuses", e)
        })
    }

    async fn delete(&self, user_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM status WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete status", e))?;
        Ok(())
    }
}
