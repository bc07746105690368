//! # statushub-cluster
//!
//! Propagates status changes and cache invalidations between server
//! processes, and fans presence updates out to locally connected clients.
//!
//! - **memory**: in-process hub; one node, or several nodes in one test
//! - **redis**: Redis pub/sub relay for multi-node deployments (feature
//!   `redis-pubsub`)

pub mod bus;
pub mod memory;
pub mod presence;
#[cfg(feature = "redis-pubsub")]
pub mod redis_pubsub;

pub use bus::{ClusterBus, ClusterHandler, HandlerRegistry, connect};
pub use memory::{MemoryClusterBus, MemoryClusterHub};
pub use presence::PresenceHub;
