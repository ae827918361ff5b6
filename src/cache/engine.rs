//! The keyed cache engine.

use super::entry::{CacheEntry, SetOptions, StoredEntry};
use super::stats::{CacheStats, Counters};
use super::sweeper::SweeperHandle;
use crate::clock::{Clock, SystemClock};
use crate::error::{CourierError, Result};
use crate::storage::DurableStorage;
use crate::types::Timestamp;
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    /// Default: 500
    pub max_entries: usize,

    /// TTL applied when a write does not specify one (None = no expiry).
    pub default_ttl: Option<Duration>,

    /// How often the background sweeper purges expired entries.
    /// Default: 60s
    pub sweep_interval: Duration,

    /// Prefix for keys in durable storage.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            default_ttl: None,
            sweep_interval: Duration::from_secs(60),
            namespace: "courier_cache_".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Host application visibility transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// In-memory entries plus the insertion counter.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Generic key/value cache with TTL, usage-based eviction, tag and pattern
/// invalidation, and an optional durable mirror for persistent entries.
///
/// Memory is the source of truth while the process lives; durable storage
/// is only read when the engine is built.
pub struct CacheEngine {
    config: CacheConfig,
    state: Mutex<CacheState>,
    storage: Option<Arc<dyn DurableStorage>>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl CacheEngine {
    /// Memory-only cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None, Arc::new(SystemClock))
    }

    /// Memory-only cache on a custom clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, None, clock)
    }

    /// Cache mirrored to `storage`, repopulated from it immediately.
    pub fn with_storage(
        config: CacheConfig,
        storage: Arc<dyn DurableStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = Self::build(config, Some(storage), clock);
        engine.restore();
        engine
    }

    fn build(
        config: CacheConfig,
        storage: Option<Arc<dyn DurableStorage>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
            storage,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn capacity(&self) -> usize {
        self.config.max_entries.max(1)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.namespace, key)
    }

    // --- Writes ---

    /// Insert or overwrite `key`.
    ///
    /// Inserting a new key into a full cache evicts one entry first. Only
    /// serialization of `value` can fail; durable-mirror failures are
    /// logged and retried by [`sync_to_storage`](Self::sync_to_storage).
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, options);
        Ok(())
    }

    /// Insert or overwrite `key` with an already-encoded value.
    pub fn set_value(&self, key: &str, value: serde_json::Value, mut options: SetOptions) {
        if options.ttl.is_none() {
            options.ttl = self.config.default_ttl;
        }
        let now = self.clock.now();
        let mut state = self.state.lock();

        if !state.entries.contains_key(key) && state.entries.len() >= self.capacity() {
            self.evict_one(&mut state);
        }

        let seq = state.next_seq();
        let mut entry = CacheEntry::new(key.to_string(), value, options, now, seq);
        if entry.persistent {
            self.mirror(&mut entry);
        }

        if let Some(previous) = state.entries.insert(key.to_string(), entry) {
            let still_persistent = state.entries.get(key).map_or(false, |e| e.persistent);
            if previous.persistent && !still_persistent {
                self.unmirror(key);
            }
        }
        Counters::bump(&self.counters.sets);
    }

    /// Remove the entry with the lowest access count, oldest access on tie.
    fn evict_one(&self, state: &mut CacheState) {
        let victim = state
            .entries
            .values()
            .min_by_key(|entry| entry.eviction_rank())
            .map(|entry| entry.key.clone());

        if let Some(key) = victim {
            if let Some(entry) = state.entries.remove(&key) {
                debug!(key = %key, access_count = entry.access_count, "evicting cache entry");
                if entry.persistent {
                    self.unmirror(&key);
                }
                Counters::bump(&self.counters.evictions);
            }
        }
    }

    // --- Reads ---

    /// Typed read. Absent, expired and undecodable entries are misses; the
    /// latter two are purged.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let value = self.live_value(&mut state, key, now)?;
        match serde_json::from_value::<T>(value) {
            Ok(decoded) => {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.touch(now);
                }
                Counters::bump(&self.counters.hits);
                Some(decoded)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "dropping undecodable cache entry");
                if let Some(entry) = state.entries.remove(key) {
                    if entry.persistent {
                        self.unmirror(key);
                    }
                }
                Counters::bump(&self.counters.misses);
                None
            }
        }
    }

    /// Typed read with a fallback.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Untyped read.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.get(key)
    }

    /// Clone of the live value, purging the entry if it has expired.
    fn live_value(
        &self,
        state: &mut CacheState,
        key: &str,
        now: Timestamp,
    ) -> Option<serde_json::Value> {
        let expired = match state.entries.get(key) {
            None => {
                Counters::bump(&self.counters.misses);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.purge_expired_key(state, key);
            Counters::bump(&self.counters.misses);
            return None;
        }

        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether a live entry exists. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match state.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => false,
            Some(false) => true,
            Some(true) => {
                self.purge_expired_key(&mut state, key);
                false
            }
        }
    }

    /// Metadata of a live entry, without counting an access.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    /// Read-through helper: return the cached value or compute, store and
    /// return a fresh one.
    pub fn get_or_insert_with<T, F>(&self, key: &str, options: SetOptions, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(cached) = self.get::<T>(key) {
            return Ok(cached);
        }
        let fresh = fetch()?;
        self.set(key, &fresh, options)?;
        Ok(fresh)
    }

    // --- Removal ---

    /// Remove `key`. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(key) {
            Some(entry) => {
                if entry.persistent {
                    self.unmirror(key);
                }
                Counters::bump(&self.counters.deletes);
                true
            }
            None => false,
        }
    }

    /// Remove everything, including durable copies under the namespace.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        Counters::add(&self.counters.deletes, removed);

        if let Some(storage) = &self.storage {
            match storage.keys() {
                Ok(keys) => {
                    for key in keys.iter().filter(|k| k.starts_with(&self.config.namespace)) {
                        if let Err(e) = storage.remove(key) {
                            warn!(key = %key, error = %e, "failed to remove durable entry");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "failed to list durable entries during clear"),
            }
        }
    }

    /// Remove every entry carrying at least one of `tags`.
    pub fn delete_by_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<S> = tags.into_iter().collect();
        self.remove_where(|entry| tags.iter().any(|tag| entry.tags.contains(tag.as_ref())))
    }

    /// Remove every entry whose key matches the regular expression `pattern`.
    pub fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(CourierError::from)?;
        Ok(self.remove_where(|entry| regex.is_match(&entry.key)))
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .entries
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &doomed {
            if let Some(entry) = state.entries.remove(key) {
                if entry.persistent {
                    self.unmirror(key);
                }
            }
        }

        Counters::add(&self.counters.deletes, doomed.len());
        doomed.len()
    }

    // --- Expiry ---

    /// Purge every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            self.purge_expired_key(&mut state, key);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    fn purge_expired_key(&self, state: &mut CacheState, key: &str) {
        if let Some(entry) = state.entries.remove(key) {
            if entry.persistent {
                self.unmirror(key);
            }
            Counters::bump(&self.counters.expired);
        }
    }

    /// Start a background thread that calls [`sweep_expired`](Self::sweep_expired)
    /// every `sweep_interval`. The thread ends when the handle is dropped or
    /// the engine is gone.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<SweeperHandle> {
        SweeperHandle::spawn(Arc::downgrade(self), self.config.sweep_interval)
    }

    // --- Persistence ---

    /// Write a persistent entry to durable storage, recording the outcome.
    fn mirror(&self, entry: &mut CacheEntry) {
        let Some(storage) = &self.storage else {
            return;
        };

        let result = serde_json::to_vec(&entry.to_stored())
            .map_err(CourierError::from)
            .and_then(|bytes| storage.write(&self.storage_key(&entry.key), &bytes));

        match result {
            Ok(()) => entry.mirrored = true,
            Err(e) => {
                warn!(key = %entry.key, error = %e, "failed to mirror cache entry");
                entry.mirrored = false;
            }
        }
    }

    fn unmirror(&self, key: &str) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove(&self.storage_key(key)) {
                warn!(key = %key, error = %e, "failed to remove durable entry");
            }
        }
    }

    /// Re-mirror persistent entries whose last durable write failed.
    /// Returns how many were written.
    pub fn sync_to_storage(&self) -> usize {
        if self.storage.is_none() {
            return 0;
        }
        let mut state = self.state.lock();
        let mut synced = 0;
        for entry in state.entries.values_mut() {
            if entry.persistent && !entry.mirrored {
                self.mirror(entry);
                if entry.mirrored {
                    synced += 1;
                }
            }
        }
        if synced > 0 {
            debug!(count = synced, "synced cache entries to storage");
        }
        synced
    }

    /// React to the host app moving between foreground and background.
    pub fn on_lifecycle(&self, event: AppLifecycle) {
        match event {
            AppLifecycle::Background => {
                self.sync_to_storage();
            }
            AppLifecycle::Foreground => {
                self.sweep_expired();
                self.sync_to_storage();
            }
        }
    }

    /// Repopulate memory from durable storage, dropping expired or corrupt
    /// entries. Best effort: failures are logged, never returned.
    fn restore(&self) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };

        let keys = match storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list durable entries; starting cold");
                return 0;
            }
        };

        let now = self.clock.now();
        let capacity = self.capacity();
        let mut state = self.state.lock();
        let mut restored = 0;

        for storage_key in keys {
            let Some(key) = storage_key.strip_prefix(&self.config.namespace) else {
                continue;
            };

            let stored = storage.read(&storage_key).and_then(|bytes| match bytes {
                Some(bytes) => serde_json::from_slice::<StoredEntry>(&bytes)
                    .map(Some)
                    .map_err(|e| CourierError::Deserialization(e.to_string())),
                None => Ok(None),
            });

            let stored = match stored {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping corrupt durable entry");
                    let _ = storage.remove(&storage_key);
                    continue;
                }
            };

            if matches!(stored.expires_at, Some(at) if at <= now) {
                let _ = storage.remove(&storage_key);
                Counters::bump(&self.counters.expired);
                continue;
            }

            if state.entries.len() >= capacity {
                debug!(key = %key, "cache full; leaving durable entry on disk");
                continue;
            }

            let seq = state.next_seq();
            let entry = stored.into_entry(key.to_string(), now, seq);
            state.entries.insert(key.to_string(), entry);
            restored += 1;
        }

        if restored > 0 {
            info!(count = restored, "restored cache entries from storage");
        }
        restored
    }

    // --- Introspection ---

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    /// Keys currently held in memory (expired ones included until purged).
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn manual_cache(max_entries: usize) -> (CacheEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let engine = CacheEngine::with_clock(
            CacheConfig::default().with_max_entries(max_entries),
            clock.clone(),
        );
        (engine, clock)
    }

    #[test]
    fn test_set_get_has_delete() {
        let (cache, _) = manual_cache(10);

        cache.set("user:1", &json!({"name": "Alice"}), SetOptions::new()).unwrap();
        assert!(cache.has("user:1"));

        let value: serde_json::Value = cache.get("user:1").unwrap();
        assert_eq!(value["name"], "Alice");

        assert!(cache.delete("user:1"));
        assert!(!cache.has("user:1"));
        assert!(!cache.delete("user:1"));
        assert_eq!(cache.get_or("user:1", 7), 7);
    }

    #[test]
    fn test_eviction_prefers_least_used() {
        let (cache, clock) = manual_cache(2);

        cache.set("a", &1, SetOptions::new()).unwrap();
        clock.advance(Duration::from_millis(1));
        cache.set("b", &2, SetOptions::new()).unwrap();
        assert_eq!(cache.get::<i32>("a"), Some(1));
        cache.set("c", &3, SetOptions::new()).unwrap();

        assert!(cache.has("a"));
        assert!(cache.has("c"));
        assert!(!cache.has("b"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_tie_breaks_on_oldest_access() {
        let (cache, clock) = manual_cache(2);

        cache.set("a", &1, SetOptions::new()).unwrap();
        cache.set("b", &2, SetOptions::new()).unwrap();
        clock.advance(Duration::from_millis(5));
        cache.get::<i32>("b");
        clock.advance(Duration::from_millis(5));
        cache.get::<i32>("a");

        // Equal counts; "b" was accessed longer ago
        cache.set("c", &3, SetOptions::new()).unwrap();
        assert!(cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = manual_cache(2);
        cache.set("a", &1, SetOptions::new()).unwrap();
        cache.set("b", &2, SetOptions::new()).unwrap();
        cache.set("a", &10, SetOptions::new()).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>("a"), Some(10));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_ttl_boundary() {
        let (cache, clock) = manual_cache(10);
        cache
            .set("token", &"abc", SetOptions::new().ttl(Duration::from_millis(1000)))
            .unwrap();

        clock.set(Timestamp(999));
        assert_eq!(cache.get::<String>("token").as_deref(), Some("abc"));

        clock.set(Timestamp(1001));
        assert_eq!(cache.get_or("token", "none".to_string()), "none");
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_default_ttl_applies() {
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let cache = CacheEngine::with_clock(
            CacheConfig::default().with_default_ttl(Duration::from_millis(50)),
            clock.clone(),
        );
        cache.set("k", &1, SetOptions::new()).unwrap();
        clock.advance(Duration::from_millis(50));
        assert!(!cache.has("k"));
    }

    #[test]
    fn test_sweep_purges_unread_entries() {
        let (cache, clock) = manual_cache(10);
        for i in 0..5 {
            cache
                .set(&format!("k{}", i), &i, SetOptions::new().ttl(Duration::from_millis(10)))
                .unwrap();
        }
        cache.set("keep", &1, SetOptions::new()).unwrap();

        clock.advance(Duration::from_millis(11));
        assert_eq!(cache.sweep_expired(), 5);
        assert_eq!(cache.keys(), vec!["keep".to_string()]);
    }

    #[test]
    fn test_delete_by_tags_and_pattern() {
        let (cache, _) = manual_cache(10);
        cache.set("user:1", &1, SetOptions::new().tag("users")).unwrap();
        cache.set("user:2", &2, SetOptions::new().tags(["users", "vip"])).unwrap();
        cache.set("checkin:1", &3, SetOptions::new().tag("checkins")).unwrap();
        cache.set("checkin:2", &4, SetOptions::new()).unwrap();

        assert_eq!(cache.delete_by_tags(["vip", "nope"]), 1);
        assert!(cache.has("user:1"));

        assert_eq!(cache.delete_by_pattern("^checkin:").unwrap(), 2);
        assert_eq!(cache.keys(), vec!["user:1".to_string()]);

        assert!(matches!(
            cache.delete_by_pattern("(unclosed"),
            Err(CourierError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_undecodable_value_is_a_miss_and_deleted() {
        let (cache, _) = manual_cache(10);
        cache.set("n", &"not a number", SetOptions::new()).unwrap();

        assert_eq!(cache.get::<u32>("n"), None);
        assert!(!cache.has("n"));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_stats_counters() {
        let (cache, _) = manual_cache(10);
        cache.set("a", &1, SetOptions::new()).unwrap();
        cache.get::<i32>("a");
        cache.get::<i32>("missing");
        cache.delete("a");

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.size, 0);

        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_get_or_insert_with() {
        let (cache, _) = manual_cache(10);
        let mut calls = 0;

        let first: Vec<u32> = cache
            .get_or_insert_with("list", SetOptions::new(), || {
                calls += 1;
                Ok(vec![1, 2])
            })
            .unwrap();
        let second: Vec<u32> = cache
            .get_or_insert_with("list", SetOptions::new(), || Ok(vec![9]))
            .unwrap();

        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![1, 2]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_persistent_entries_mirror_and_restore() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let config = CacheConfig::default().with_namespace("app_");

        {
            let cache = CacheEngine::with_storage(config.clone(), storage.clone(), clock.clone());
            cache.set("profile", &json!({"id": 1}), SetOptions::new().persistent()).unwrap();
            cache.set("scratch", &1, SetOptions::new()).unwrap();
            cache
                .set("short", &2, SetOptions::new().persistent().ttl(Duration::from_millis(10)))
                .unwrap();
        }
        assert!(storage.contains("app_profile"));
        assert!(!storage.contains("app_scratch"));

        clock.advance(Duration::from_millis(20));
        let cache = CacheEngine::with_storage(config, storage.clone(), clock);

        let profile: serde_json::Value = cache.get("profile").unwrap();
        assert_eq!(profile["id"], 1);
        assert!(!cache.has("scratch"));
        assert!(!cache.has("short"));
        assert!(!storage.contains("app_short"));
    }

    #[test]
    fn test_corrupt_durable_entry_dropped_on_restore() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_raw("courier_cache_bad", b"{not json".to_vec());

        let cache = CacheEngine::with_storage(
            CacheConfig::default(),
            storage.clone(),
            Arc::new(ManualClock::default()),
        );
        assert!(!cache.has("bad"));
        assert!(!storage.contains("courier_cache_bad"));
    }

    #[test]
    fn test_delete_and_clear_remove_durable_copies() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheEngine::with_storage(
            CacheConfig::default(),
            storage.clone(),
            Arc::new(ManualClock::default()),
        );
        cache.set("a", &1, SetOptions::new().persistent()).unwrap();
        cache.set("b", &2, SetOptions::new().persistent()).unwrap();
        storage.insert_raw("other_namespace", b"x".to_vec());

        cache.delete("a");
        assert!(!storage.contains("courier_cache_a"));

        cache.clear();
        assert!(!storage.contains("courier_cache_b"));
        assert!(storage.contains("other_namespace"));
    }

    #[test]
    fn test_failed_mirror_is_synced_on_background() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheEngine::with_storage(
            CacheConfig::default(),
            storage.clone(),
            Arc::new(ManualClock::default()),
        );

        storage.set_write_failure(true);
        cache.set("draft", &"hello", SetOptions::new().persistent()).unwrap();
        assert!(!storage.contains("courier_cache_draft"));
        assert_eq!(cache.get::<String>("draft").as_deref(), Some("hello"));

        storage.set_write_failure(false);
        cache.on_lifecycle(AppLifecycle::Background);
        assert!(storage.contains("courier_cache_draft"));
        assert_eq!(cache.sync_to_storage(), 0);
    }

    #[test]
    fn test_overwrite_as_non_persistent_drops_durable_copy() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheEngine::with_storage(
            CacheConfig::default(),
            storage.clone(),
            Arc::new(ManualClock::default()),
        );
        cache.set("k", &1, SetOptions::new().persistent()).unwrap();
        cache.set("k", &2, SetOptions::new()).unwrap();
        assert!(!storage.contains("courier_cache_k"));
    }
}
