//! Per-topic message delivery.
//!
//! A [`DeliveryEngine`] keeps one topic's subscribers fed. It prefers the
//! backend's change stream ([`PushStrategy`]) when the host supports it and
//! falls back to interval polling ([`PollStrategy`]) when the stream cannot
//! be attached or breaks. The fallback never reverses.
//!
//! Both strategies hand messages to the same dispatch gate, which admits
//! them into the [`MessageStore`](crate::messages::MessageStore) and fans
//! out only what the store accepted.

mod dispatch;
mod engine;
mod poll;
mod push;

pub use engine::{DeliveryEngine, EngineState};
pub use poll::PollStrategy;
pub use push::{message_from_document, PushStrategy};

pub(crate) use dispatch::Dispatcher;

use crate::error::Result;
use crate::types::Message;
use std::fmt;
use std::time::Duration;

/// Receives every admitted message of a topic.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: &Message);
}

/// Which strategy an engine is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Push,
    Poll,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Push => f.write_str("push"),
            StrategyKind::Poll => f.write_str("poll"),
        }
    }
}

/// A way of obtaining a topic's new messages.
pub trait DeliveryStrategy: Send {
    /// Begin delivering. An error means nothing was started.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering. Idempotent. Never blocks on background work.
    fn stop(&mut self);

    /// After `stop`, wait for background work to wind down. Must not be
    /// called while holding a lock a subscriber callback could need.
    fn join(&mut self) {}

    fn kind(&self) -> StrategyKind;
}

/// Delivery configuration.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Wait between poll cycles.
    /// Default: 3 seconds
    pub poll_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl DeliveryConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
