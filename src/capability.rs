//! Host capability detection.
//!
//! Decides once whether the host offers a usable push channel. The answer
//! is a plain [`TransportCapability`] value handed to every delivery
//! engine, so no code path branches on the host anywhere else.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Oldest host SDK whose change-stream API is trusted.
pub const DEFAULT_MIN_PUSH_SDK: &str = "2.8.1";

/// Whether a genuine push channel is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportCapability {
    pub supports_push: bool,
}

impl TransportCapability {
    pub fn push() -> Self {
        Self { supports_push: true }
    }

    pub fn poll_only() -> Self {
        Self {
            supports_push: false,
        }
    }
}

/// What the host reports about itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// Platform name (e.g. "ios", "android", "devtools").
    pub platform: String,
    /// Host SDK version, dotted numeric.
    pub sdk_version: Option<String>,
    /// Whether the backend client exposes a change-stream API at all.
    pub change_stream_api: bool,
}

impl HostInfo {
    /// A host with the change-stream API at the given SDK version.
    pub fn with_change_stream(sdk_version: impl Into<String>) -> Self {
        Self {
            platform: "unknown".into(),
            sdk_version: Some(sdk_version.into()),
            change_stream_api: true,
        }
    }

    /// A host that only supports request/response.
    pub fn fetch_only() -> Self {
        Self {
            platform: "unknown".into(),
            sdk_version: None,
            change_stream_api: false,
        }
    }
}

/// Source of [`HostInfo`].
pub trait HostProbe: Send + Sync {
    fn host_info(&self) -> HostInfo;
}

impl HostProbe for HostInfo {
    fn host_info(&self) -> HostInfo {
        self.clone()
    }
}

/// Reads `COURIER_PLATFORM`, `COURIER_SDK_VERSION` and
/// `COURIER_CHANGE_STREAM` (`1`/`true` to enable).
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvHostProbe;

impl HostProbe for EnvHostProbe {
    fn host_info(&self) -> HostInfo {
        let change_stream_api = std::env::var("COURIER_CHANGE_STREAM")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        HostInfo {
            platform: std::env::var("COURIER_PLATFORM").unwrap_or_else(|_| "unknown".into()),
            sdk_version: std::env::var("COURIER_SDK_VERSION").ok(),
            change_stream_api,
        }
    }
}

/// Detection settings.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Never use push, whatever the host says.
    pub force_poll: bool,
    /// Minimum SDK version for push.
    pub min_push_sdk_version: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            force_poll: false,
            min_push_sdk_version: DEFAULT_MIN_PUSH_SDK.to_string(),
        }
    }
}

/// Inspects the host once and caches the verdict until [`reset`](Self::reset).
pub struct CapabilityDetector {
    probe: Arc<dyn HostProbe>,
    config: DetectorConfig,
    cached: Mutex<Option<TransportCapability>>,
}

impl CapabilityDetector {
    pub fn new(probe: Arc<dyn HostProbe>, config: DetectorConfig) -> Self {
        Self {
            probe,
            config,
            cached: Mutex::new(None),
        }
    }

    /// Detector with default settings over a fixed host description.
    pub fn for_host(host: HostInfo) -> Self {
        Self::new(Arc::new(host), DetectorConfig::default())
    }

    /// The host's capability. Never fails; without positive evidence of a
    /// change-stream API on a recent enough SDK the answer is poll-only.
    pub fn detect(&self) -> TransportCapability {
        let mut cached = self.cached.lock();
        if let Some(capability) = *cached {
            return capability;
        }

        let host = self.probe.host_info();
        let capability = TransportCapability {
            supports_push: !self.config.force_poll
                && host.change_stream_api
                && host
                    .sdk_version
                    .as_deref()
                    .and_then(|v| compare_versions(v, &self.config.min_push_sdk_version))
                    .map_or(false, |ordering| ordering != Ordering::Less),
        };

        debug!(
            platform = %host.platform,
            sdk_version = ?host.sdk_version,
            supports_push = capability.supports_push,
            "detected transport capability"
        );
        *cached = Some(capability);
        capability
    }

    /// Forget the cached verdict; the next `detect` inspects the host again.
    pub fn reset(&self) {
        *self.cached.lock() = None;
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare dotted numeric versions; missing components count as zero.
fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}
