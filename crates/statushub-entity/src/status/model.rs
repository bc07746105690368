//! Status record entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use statushub_core::error::AppError;
use statushub_core::result::AppResult;

use super::UserStatus;

/// Longest accepted user identifier.
pub const MAX_USER_ID_LEN: usize = 64;

/// Last known status of one user.
///
/// This is both the `status` table row and the value held by the status
/// cache. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StatusRecord {
    /// User the record belongs to.
    pub user_id: String,
    /// Current presence state.
    pub status: UserStatus,
    /// Whether the state was set explicitly and must not be overwritten by
    /// inferred (non-manual) transitions.
    pub manual: bool,
    /// Last known activity.
    pub last_activity_at: i64,
    /// Channel the user is currently viewing.
    pub active_channel: Option<String>,
    /// State restored when a timed DND expires.
    pub previous_status: Option<UserStatus>,
    /// Deadline of a timed DND.
    pub dnd_end_time: Option<i64>,
}

impl StatusRecord {
    /// Create a record with the given state and no DND bookkeeping.
    pub fn new(
        user_id: impl Into<String>,
        status: UserStatus,
        manual: bool,
        last_activity_at: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            status,
            manual,
            last_activity_at,
            active_channel: None,
            previous_status: None,
            dnd_end_time: None,
        }
    }

    /// The record assumed for a user nobody has seen yet: offline,
    /// inferred, never active.
    pub fn offline_default(user_id: impl Into<String>) -> Self {
        Self::new(user_id, UserStatus::Offline, false, 0)
    }

    /// Whether this is a timed DND whose deadline has passed.
    pub fn is_dnd_expired(&self, now: i64) -> bool {
        self.status == UserStatus::Dnd
            && self.manual
            && self.dnd_end_time.is_some_and(|end| end <= now)
    }

    /// Whether `other` differs in anything clients can see: the state, its
    /// stickiness or the DND deadline.
    pub fn is_visible_change(&self, other: &Self) -> bool {
        self.status != other.status
            || self.manual != other.manual
            || self.dnd_end_time != other.dnd_end_time
    }

    /// Check the record shape before it is written anywhere.
    pub fn validate(&self) -> AppResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::validation("User ID cannot be empty"));
        }
        if self.user_id.len() > MAX_USER_ID_LEN {
            return Err(AppError::validation(format!(
                "User ID cannot exceed {MAX_USER_ID_LEN} characters"
            )));
        }
        if self.last_activity_at < 0 {
            return Err(AppError::validation("Last activity cannot be negative"));
        }
        if self.dnd_end_time.is_some() && !(self.status == UserStatus::Dnd && self.manual) {
            return Err(AppError::validation(
                "A DND end time requires a manual DND status",
            ));
        }
        Ok(())
    }
}
