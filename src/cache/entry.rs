//! Cache entries and their persisted form.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Options for [`CacheEngine::set`](super::CacheEngine::set).
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    /// Time to live. `None` falls back to the engine's default TTL.
    pub ttl: Option<Duration>,
    /// Invalidation tags.
    pub tags: BTreeSet<String>,
    /// Mirror the entry to durable storage.
    pub persistent: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// A stored key/value pair with expiry and eviction metadata.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub access_count: u64,
    pub last_accessed: Timestamp,
    pub tags: BTreeSet<String>,
    pub persistent: bool,
    /// Insertion order, the final eviction tie-breaker.
    pub(crate) seq: u64,
    /// Whether the durable copy matches this entry.
    pub(crate) mirrored: bool,
}

impl CacheEntry {
    pub(crate) fn new(
        key: String,
        value: serde_json::Value,
        options: SetOptions,
        now: Timestamp,
        seq: u64,
    ) -> Self {
        Self {
            key,
            value,
            created_at: now,
            expires_at: options.ttl.map(|ttl| now.after(ttl)),
            access_count: 0,
            last_accessed: now,
            tags: options.tags,
            persistent: options.persistent,
            seq,
            mirrored: false,
        }
    }

    /// An entry is expired once `now` reaches its expiry time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub(crate) fn touch(&mut self, now: Timestamp) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Eviction rank: lower ranks are evicted first.
    pub(crate) fn eviction_rank(&self) -> (u64, Timestamp, u64) {
        (self.access_count, self.last_accessed, self.seq)
    }

    pub(crate) fn to_stored(&self) -> StoredEntry {
        StoredEntry {
            value: self.value.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            tags: self.tags.clone(),
            persistent: self.persistent,
        }
    }
}

/// The persisted form of an entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredEntry {
    pub value: serde_json::Value,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub persistent: bool,
}

impl StoredEntry {
    pub(crate) fn into_entry(self, key: String, now: Timestamp, seq: u64) -> CacheEntry {
        CacheEntry {
            key,
            value: self.value,
            created_at: self.created_at,
            expires_at: self.expires_at,
            access_count: 0,
            last_accessed: now,
            tags: self.tags,
            persistent: self.persistent,
            seq,
            mirrored: true,
        }
    }
}
