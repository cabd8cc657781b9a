//! Result-set cache stores
//!
//! - [`MemoryStore`]: in-process, TTL + memory bound with eviction
//! - [`TieredStore`]: local tier in front of a remote one
//! - `RedisStore` (feature `redis`): shared remote tier

pub mod config;
mod entry;
#[cfg(feature = "redis")]
pub mod proxy;
mod store;
mod tiered;

pub use config::{format_memory_size, parse_memory_size, StoreConfig};
pub use entry::{Entry, Key};
#[cfg(feature = "redis")]
pub use proxy::RedisStore;
pub use store::{CacheStore, EvictionPolicy, MemoryStore, SkipMode, StoreStats};
pub use tiered::TieredStore;
