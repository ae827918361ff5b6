//! Top-level configuration.

use crate::cache::CacheConfig;
use crate::capability::DetectorConfig;
use crate::delivery::DeliveryConfig;
use crate::error::{CourierError, Result};
use crate::messages::MessageStoreConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration of a [`Courier`](crate::Courier).
#[derive(Clone, Debug, Default)]
pub struct CourierConfig {
    pub cache: CacheConfig,
    pub delivery: DeliveryConfig,
    pub messages: MessageStoreConfig,
    pub detector: DetectorConfig,

    /// Directory for the durable cache mirror (None = memory only).
    pub storage_path: Option<PathBuf>,
}

impl CourierConfig {
    /// Defaults overridden by `COURIER_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `COURIER_POLL_INTERVAL_MS` | `delivery.poll_interval` |
    /// | `COURIER_CACHE_MAX_ENTRIES` | `cache.max_entries` |
    /// | `COURIER_CACHE_SWEEP_SECS` | `cache.sweep_interval` |
    /// | `COURIER_CACHE_PREFIX` | `cache.namespace` |
    /// | `COURIER_WINDOW_SIZE` | `messages.window_size` |
    /// | `COURIER_FORCE_POLL` | `detector.force_poll` |
    /// | `COURIER_MIN_PUSH_SDK` | `detector.min_push_sdk_version` |
    /// | `COURIER_STORAGE_DIR` | `storage_path` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64>(&lookup, "COURIER_POLL_INTERVAL_MS")? {
            config.delivery.poll_interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse::<usize>(&lookup, "COURIER_CACHE_MAX_ENTRIES")? {
            config.cache.max_entries = max;
        }
        if let Some(secs) = parse::<u64>(&lookup, "COURIER_CACHE_SWEEP_SECS")? {
            config.cache.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(prefix) = lookup("COURIER_CACHE_PREFIX") {
            config.cache.namespace = prefix;
        }
        if let Some(size) = parse::<usize>(&lookup, "COURIER_WINDOW_SIZE")? {
            config.messages.window_size = size;
        }
        if let Some(raw) = lookup("COURIER_FORCE_POLL") {
            config.detector.force_poll = parse_flag("COURIER_FORCE_POLL", &raw)?;
        }
        if let Some(version) = lookup("COURIER_MIN_PUSH_SDK") {
            config.detector.min_push_sdk_version = version;
        }
        if let Some(dir) = lookup("COURIER_STORAGE_DIR") {
            config.storage_path = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_messages(mut self, messages: MessageStoreConfig) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CourierError::Config(format!("{}={:?}: {}", name, raw, e))),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(CourierError::Config(format!("{}={:?}: expected a boolean", name, raw))),
    }
}
