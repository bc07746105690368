//! Cluster topics shared by caches and the cluster bus.
//!
//! Every logical cache names the topic its remote invalidations travel on.
//! Caches that are already shared across nodes report
//! [`InvalidationTopic::None`] and never need peer invalidation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broadcast topic identifying which logical cache a remote invalidation
/// targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTopic {
    /// The cache is shared by all nodes; nothing to invalidate remotely.
    None,
    /// User status records.
    Status,
    /// User profiles.
    Users,
    /// Teams.
    Teams,
    /// Channels.
    Channels,
    /// Incoming/outgoing webhooks.
    Webhooks,
}

impl InvalidationTopic {
    /// Return the topic as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Status => "status",
            Self::Users => "users",
            Self::Teams => "teams",
            Self::Channels => "channels",
            Self::Webhooks => "webhooks",
        }
    }

    /// Whether remote nodes must be told about changes to this cache.
    pub fn needs_peer_sync(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for InvalidationTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
