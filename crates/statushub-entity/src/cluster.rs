//! Messages exchanged between cluster nodes and pushed to clients.
//!
//! The set of event kinds is closed: every handler matches on
//! [`ClusterEvent`] exhaustively, so adding a kind is a compile error
//! until each consumer decides what to do with it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use statushub_core::events::InvalidationTopic;

use crate::status::{StatusRecord, UserStatus};

/// Presence update delivered to connected client sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// User whose presence changed.
    pub user_id: String,
    /// New presence state.
    pub status: UserStatus,
    /// Whether the new state was set explicitly.
    pub manual: bool,
    /// Last known activity, epoch milliseconds.
    pub last_activity_at: i64,
    /// Deadline of a timed DND, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnd_end_time: Option<i64>,
}

impl From<&StatusRecord> for PresenceEvent {
    fn from(status: &StatusRecord) -> Self {
        Self {
            user_id: status.user_id.clone(),
            status: status.status,
            manual: status.manual,
            last_activity_at: status.last_activity_at,
            dnd_end_time: status.dnd_end_time,
        }
    }
}

/// Event carried between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// A node changed a status record; peers with a node-local status cache
    /// store it without re-publishing.
    UpdateStatus(StatusRecord),
    /// A presence change peers relay to their own connected clients.
    PresenceChanged(PresenceEvent),
    /// Drop one key (or, with `key = None`, everything) from every cache
    /// registered for `topic`.
    InvalidateCache {
        /// Target cache topic.
        topic: InvalidationTopic,
        /// Key to remove; `None` purges the cache.
        key: Option<String>,
    },
}

/// Discriminant of [`ClusterEvent`], used to register handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterEventKind {
    /// See [`ClusterEvent::UpdateStatus`].
    UpdateStatus,
    /// See [`ClusterEvent::PresenceChanged`].
    PresenceChanged,
    /// See [`ClusterEvent::InvalidateCache`].
    InvalidateCache,
}

impl ClusterEvent {
    /// The kind of this event.
    pub fn kind(&self) -> ClusterEventKind {
        match self {
            Self::UpdateStatus(_) => ClusterEventKind::UpdateStatus,
            Self::PresenceChanged(_) => ClusterEventKind::PresenceChanged,
            Self::InvalidateCache { .. } => ClusterEventKind::InvalidateCache,
        }
    }
}

/// Envelope of an event on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMessage {
    /// Node that published the event; receivers skip their own messages.
    pub origin: Uuid,
    /// The event itself.
    pub event: ClusterEvent,
}

impl ClusterMessage {
    /// Wrap an event published by `origin`.
    pub fn new(origin: Uuid, event: ClusterEvent) -> Self {
        Self { origin, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_tagged() {
        let msg = ClusterMessage::new(
            Uuid::nil(),
            ClusterEvent::InvalidateCache {
                topic: InvalidationTopic::Status,
                key: None,
            },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"]["kind"], "invalidate_cache");
        assert_eq!(json["event"]["payload"]["topic"], "status");
        let back: ClusterMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_presence_from_record() {
        let status = StatusRecord::new("u1", UserStatus::Away, false, 42);
        let event = PresenceEvent::from(&status);
        assert_eq!(event.status, UserStatus::Away);
        assert_eq!(event.last_activity_at, 42);
        assert_eq!(event.dnd_end_time, None);
        assert_eq!(
            ClusterEvent::PresenceChanged(event).kind(),
            ClusterEventKind::PresenceChanged
        );
    }

    #[test]
    fn test_presence_carries_dnd_deadline() {
        let status = StatusRecord {
            previous_status: Some(UserStatus::Online),
            dnd_end_time: Some(9_000),
            ..StatusRecord::new("u1", UserStatus::Dnd, true, 42)
        };
        let event = PresenceEvent::from(&status);
        assert_eq!(event.dnd_end_time, Some(9_000));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["dnd_end_time"], 9_000);
        let offline = StatusRecord::offline_default("u2");
        let plain = serde_json::to_value(PresenceEvent::from(&offline)).unwrap();
        assert!(plain.get("dnd_end_time").is_none());
    }
}
