//! Durable key/value storage backing the cache's persisted tier.
//!
//! Storage is byte-oriented and knows nothing about cache entries; the
//! cache engine owns encoding, namespacing and expiry. Two backends ship
//! with the crate:
//!
//! - [`FileStorage`]: one checksummed file per key in a locked directory
//! - [`MemoryStorage`]: a process-local map, for tests and ephemeral hosts

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Byte-level durable key/value store.
pub trait DurableStorage: Send + Sync {
    /// Read the bytes stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>>;
}
