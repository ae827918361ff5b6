//! Generic keyed cache with expiry, eviction and a durable mirror.
//!
//! The cache stores JSON values under string keys and is used both by the
//! message store and by any view that wants to shield itself from backend
//! latency.
//!
//! - **Expiry**: per-entry TTL, checked on every read and purged by a
//!   background sweeper
//! - **Eviction**: when full, the entry with the lowest access count goes
//!   first, oldest access on tie
//! - **Invalidation**: by key, by tag, by key pattern, or everything
//! - **Persistence**: entries marked persistent are mirrored to a
//!   [`DurableStorage`](crate::storage::DurableStorage) and restored on start
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheEngine::new(CacheConfig::default().with_max_entries(2));
//!
//! cache.set("a", &1, SetOptions::new())?;
//! cache.set("b", &2, SetOptions::new())?;
//! cache.get::<i32>("a");                    // bump "a"
//! cache.set("c", &3, SetOptions::new())?;   // evicts "b"
//!
//! assert!(cache.has("a") && cache.has("c") && !cache.has("b"));
//! ```

mod engine;
mod entry;
mod stats;
mod sweeper;

pub use engine::{AppLifecycle, CacheConfig, CacheEngine};
pub use entry::{CacheEntry, SetOptions};
pub use stats::CacheStats;
pub use sweeper::SweeperHandle;
