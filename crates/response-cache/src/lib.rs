//! In-process TTL cache for orchestrated AI responses, plus the cache-key builder.

pub mod key;
pub mod store;

pub use key::build_key;
pub use store::{CacheConfig, CacheStats, CacheStore};
