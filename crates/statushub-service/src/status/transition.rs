//! Pure status transition rules.
//!
//! Each function takes the user's current record and returns what it
//! should become. Nothing here touches the store, the cache or the clock;
//! [`StatusService`](super::StatusService) supplies `now` and applies the
//! decision.

use statushub_core::error::AppError;
use statushub_core::result::AppResult;
use statushub_entity::status::{StatusRecord, UserStatus};

/// A user's record as loaded at the start of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    /// The record, or the offline default if none exists.
    pub record: StatusRecord,
    /// Whether the record exists in the store.
    pub persisted: bool,
}

impl Current {
    /// A user nobody has recorded yet.
    pub fn missing(user_id: &str) -> Self {
        Self {
            record: StatusRecord::offline_default(user_id),
            persisted: false,
        }
    }
}

/// Outcome of a transition rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the record untouched.
    Keep,
    /// Replace the record.
    Apply(StatusRecord),
}

/// Whether applying `next` over `prev` needs a full write, as opposed to an
/// activity-only refresh.
pub fn needs_full_save(current: &Current, next: &StatusRecord) -> bool {
    let prev = &current.record;
    !current.persisted
        || prev.status != next.status
        || prev.manual != next.manual
        || prev.dnd_end_time != next.dnd_end_time
        || prev.previous_status != next.previous_status
        || prev.active_channel != next.active_channel
}

/// Move to `status`, clearing the active channel when the state changes
/// and dropping any DND bookkeeping.
fn change(prev: &StatusRecord, status: UserStatus, manual: bool) -> StatusRecord {
    let mut next = prev.clone();
    if next.status != status {
        next.active_channel = None;
    }
    next.status = status;
    next.manual = manual;
    next.previous_status = None;
    next.dnd_end_time = None;
    next
}

/// "Set online". Online is never manual; `manual` only says whether the
/// caller may override a manual status.
pub fn online(current: &Current, manual: bool, now: i64) -> Decision {
    let prev = &current.record;
    if prev.manual && !manual {
        return Decision::Keep;
    }
    let mut next = change(prev, UserStatus::Online, false);
    next.last_activity_at = now;
    Decision::Apply(next)
}

/// Activity signal from a connected client.
///
/// Refreshes the activity timestamp; a non-manual user who is not online
/// becomes online.
pub fn heartbeat(current: &Current, now: i64) -> Decision {
    let prev = &current.record;
    if prev.manual || prev.status == UserStatus::Online {
        let mut next = prev.clone();
        next.last_activity_at = now;
        return Decision::Apply(next);
    }
    online(current, false, now)
}

/// The user opened `channel` (or, with `None`, left every channel).
///
/// Viewing a channel is activity: a non-manual user becomes online and an
/// unknown user starts out online.
pub fn active_channel(current: &Current, channel: Option<String>, now: i64) -> Decision {
    let prev = &current.record;
    let mut next = if !current.persisted || (!prev.manual && channel.is_some()) {
        change(prev, UserStatus::Online, false)
    } else {
        prev.clone()
    };
    next.active_channel = channel;
    next.last_activity_at = now;
    Decision::Apply(next)
}

/// "Set offline".
pub fn offline(current: &Current, manual: bool, now: i64) -> Decision {
    let prev = &current.record;
    if prev.manual && !manual {
        return Decision::Keep;
    }
    let mut next = change(prev, UserStatus::Offline, manual);
    next.active_channel = None;
    next.last_activity_at = now;
    Decision::Apply(next)
}

/// "Set away if needed". A non-manual call only moves an idle user.
pub fn away_if_needed(current: &Current, manual: bool, now: i64, away_timeout_ms: i64) -> Decision {
    let prev = &current.record;
    if prev.manual && !manual {
        return Decision::Keep;
    }
    if !manual {
        if prev.status == UserStatus::Away {
            return Decision::Keep;
        }
        if now.saturating_sub(prev.last_activity_at) < away_timeout_ms {
            return Decision::Keep;
        }
    }
    let mut next = change(prev, UserStatus::Away, manual);
    next.active_channel = None;
    Decision::Apply(next)
}

/// "Set DND timed": DND until `end_time`, then back to the current state.
pub fn dnd_timed(current: &Current, end_time: i64, now: i64) -> AppResult<Decision> {
    if end_time <= 0 || end_time <= now {
        return Err(AppError::validation("DND end time must be in the future"));
    }
    let prev = &current.record;
    // Re-timing an existing DND keeps the state it will restore.
    let restore = match prev.status {
        UserStatus::Dnd => prev.previous_status.unwrap_or(UserStatus::Online),
        other => other,
    };
    let mut next = change(prev, UserStatus::Dnd, true);
    next.previous_status = Some(restore);
    next.dnd_end_time = Some(end_time);
    Ok(Decision::Apply(next))
}

/// "Set DND" without a deadline.
pub fn dnd(current: &Current) -> Decision {
    Decision::Apply(change(&current.record, UserStatus::Dnd, true))
}

/// "Set out of office".
pub fn out_of_office(current: &Current) -> Decision {
    Decision::Apply(change(&current.record, UserStatus::OutOfOffice, true))
}

/// Administrative reset: offline, non-manual, regardless of stickiness.
pub fn reset(current: &Current) -> Decision {
    let mut next = change(&current.record, UserStatus::Offline, false);
    next.active_channel = None;
    Decision::Apply(next)
}
