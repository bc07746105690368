//! # statushub-cache
//!
//! Cache provider implementations for StatusHub. Supports two modes:
//!
//! - **memory**: bounded in-process cache using [moka](https://crates.io/crates/moka),
//!   one instance per logical cache, invalidated across nodes through the
//!   cluster bus
//! - **redis**: shared cache using the [redis](https://crates.io/crates/redis) crate,
//!   logical caches separated by a `name:` key prefix
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
