//! # Courier
//!
//! Client-side message delivery and caching for chat front ends.
//!
//! ## Core Concepts
//!
//! - **Delivery**: one engine per topic, push when the host has a working
//!   change stream, interval polling otherwise, with a one-way fallback
//! - **Watermarks**: per-topic `(timestamp, id)` markers that make every
//!   message reach subscribers exactly once per process
//! - **Cache**: a keyed store with TTL, usage-based eviction, tag and
//!   pattern invalidation, and a durable mirror that survives restarts
//!
//! ## Example
//!
//! ```ignore
//! use courier::{Courier, CourierConfig, EnvHostProbe, InMemoryTransport, SendOptions};
//!
//! let courier = Courier::new(
//!     CourierConfig::from_env()?,
//!     Arc::new(InMemoryTransport::new()),
//!     Arc::new(EnvHostProbe),
//! )?;
//!
//! let token = courier.subscribe("g1", |message| println!("{}", message.content))?;
//! courier.send("g1", "hello", SendOptions::from_sender("u1", "Alice")).wait()?;
//!
//! // Later, without a network round trip
//! let history = courier.get_cached("g1", 20);
//! courier.unsubscribe(&token);
//! ```

pub mod cache;
pub mod capability;
pub mod client;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod messages;
pub mod storage;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::{AppLifecycle, CacheConfig, CacheEngine, CacheEntry, CacheStats, SetOptions, SweeperHandle};
pub use capability::{
    CapabilityDetector, DetectorConfig, EnvHostProbe, HostInfo, HostProbe, TransportCapability,
};
pub use client::{Courier, PendingSend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CourierConfig;
pub use delivery::{
    DeliveryConfig, DeliveryEngine, DeliveryStrategy, EngineState, MessageSink, StrategyKind,
};
pub use error::{CourierError, Result};
pub use messages::{MessageStore, MessageStoreConfig};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use subscriptions::{SubscriptionId, SubscriptionRegistry, SubscriptionToken};
pub use transport::{ChangeEvent, ChangeHandler, ChangeStream, InMemoryTransport, Transport};
pub use types::*;
