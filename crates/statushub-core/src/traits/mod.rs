//! Core traits defined in `statushub-core` and implemented by other crates.

pub mod cache;

pub use cache::{CacheCodec, CacheProvider, CacheProviderExt};
