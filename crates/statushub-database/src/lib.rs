//! # statushub-database
//!
//! PostgreSQL connection management and the durable status store, plus an
//! in-memory store with the same contract for single-node setups and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::MemoryStatusStore;
pub use repositories::status::{StatusRepository, StatusStore};
