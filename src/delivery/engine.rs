//! Strategy selection and the push-to-poll fallback.

use super::poll::PollStrategy;
use super::push::{FailureHook, PushStrategy};
use super::{DeliveryConfig, DeliveryStrategy, Dispatcher, MessageSink, StrategyKind};
use crate::capability::TransportCapability;
use crate::error::{CourierError, Result};
use crate::messages::MessageStore;
use crate::transport::Transport;
use crate::types::TopicId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Lifecycle of a [`DeliveryEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Starting,
    Active(StrategyKind),
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => f.write_str("idle"),
            EngineState::Starting => f.write_str("starting"),
            EngineState::Active(kind) => write!(f, "active({})", kind),
            EngineState::Stopped => f.write_str("stopped"),
        }
    }
}

struct Lifecycle {
    state: EngineState,
    strategy: Option<Box<dyn DeliveryStrategy>>,
    /// Stopped but possibly still winding down.
    retired: Option<Box<dyn DeliveryStrategy>>,
}

struct Shared {
    topic: TopicId,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    capability: TransportCapability,
    config: DeliveryConfig,
    lifecycle: Mutex<Lifecycle>,
    /// Set once the change stream reported an error, even mid-attach.
    push_failed: AtomicBool,
}

impl Shared {
    /// Replace whatever runs with polling. Caller holds the lifecycle lock.
    fn start_polling(&self, lifecycle: &mut Lifecycle) {
        if let Some(mut previous) = lifecycle.strategy.take() {
            previous.stop();
        }

        let mut poll = PollStrategy::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.dispatcher),
            self.config.poll_interval,
        );
        match poll.start() {
            Ok(()) => {
                lifecycle.strategy = Some(Box::new(poll));
                lifecycle.state = EngineState::Active(StrategyKind::Poll);
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "failed to start polling; engine stopped");
                self.dispatcher.stop();
                lifecycle.state = EngineState::Stopped;
            }
        }
    }

    fn fall_back(&self, reason: &str) {
        self.push_failed.store(true, Ordering::SeqCst);

        let mut lifecycle = self.lifecycle.lock();
        // While starting, `start` itself notices the flag
        if lifecycle.state != EngineState::Active(StrategyKind::Push) {
            return;
        }
        info!(topic = %self.topic, reason, "change stream failed; falling back to polling");
        self.start_polling(&mut lifecycle);
    }
}

/// Keeps one topic's subscribers supplied with new messages.
///
/// Chooses push when the host supports it, otherwise polling. A push
/// channel that fails to attach, or breaks later, is replaced by polling
/// for the rest of the engine's life. Every message goes through the
/// topic's [`MessageStore`] before reaching the sink, so whichever
/// strategy runs, subscribers never see a message twice.
pub struct DeliveryEngine {
    shared: Arc<Shared>,
}

impl DeliveryEngine {
    pub fn new(
        topic: TopicId,
        transport: Arc<dyn Transport>,
        store: Arc<MessageStore>,
        sink: Arc<dyn MessageSink>,
        capability: TransportCapability,
        config: DeliveryConfig,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(topic.clone(), store, sink));
        Self {
            shared: Arc::new(Shared {
                topic,
                transport,
                dispatcher,
                capability,
                config,
                lifecycle: Mutex::new(Lifecycle {
                    state: EngineState::Idle,
                    strategy: None,
                    retired: None,
                }),
                push_failed: AtomicBool::new(false),
            }),
        }
    }

    pub fn topic(&self) -> &TopicId {
        &self.shared.topic
    }

    pub fn state(&self) -> EngineState {
        self.shared.lifecycle.lock().state
    }

    /// Begin delivery. Only the first call from `Idle` does anything.
    ///
    /// Push problems never surface here; they become polling. An error
    /// means not even the poll thread could be started.
    pub fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state != EngineState::Idle {
                return Ok(());
            }
            lifecycle.state = EngineState::Starting;
        }

        // Attach without the lock: the transport may report a failure
        // synchronously, which re-enters `fall_back`.
        let push = if self.shared.capability.supports_push {
            let mut push = PushStrategy::new(
                Arc::clone(&self.shared.transport),
                Arc::clone(&self.shared.dispatcher),
                self.failure_hook(),
            );
            match push.start() {
                Ok(()) => Some(push),
                Err(e) => {
                    info!(topic = %self.shared.topic, error = %e, "push start failed; polling instead");
                    None
                }
            }
        } else {
            None
        };

        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state == EngineState::Stopped {
            if let Some(mut push) = push {
                push.stop();
            }
            return Ok(());
        }

        match push {
            Some(push) if !self.shared.push_failed.load(Ordering::SeqCst) => {
                lifecycle.strategy = Some(Box::new(push));
                lifecycle.state = EngineState::Active(StrategyKind::Push);
            }
            other => {
                if let Some(mut push) = other {
                    info!(topic = %self.shared.topic, "change stream failed while attaching; polling instead");
                    push.stop();
                }
                self.shared.start_polling(&mut lifecycle);
            }
        }

        debug!(topic = %self.shared.topic, state = %lifecycle.state, "delivery engine started");
        if lifecycle.state == EngineState::Stopped {
            return Err(CourierError::Transport(format!(
                "could not start delivery for topic {}",
                self.shared.topic
            )));
        }
        Ok(())
    }

    /// Stop delivery for good. Idempotent.
    ///
    /// A fetch already in flight completes and its messages are admitted,
    /// but nothing more reaches the sink.
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state == EngineState::Stopped {
            return;
        }
        self.shared.dispatcher.stop();
        if let Some(mut strategy) = lifecycle.strategy.take() {
            strategy.stop();
            lifecycle.retired = Some(strategy);
        }
        lifecycle.state = EngineState::Stopped;
        debug!(topic = %self.shared.topic, "delivery engine stopped");
    }

    /// After [`stop`](Self::stop), wait until no background thread of this
    /// engine is still running. Returns at once when called from the
    /// engine's own poll thread.
    pub fn join(&self) {
        let retired = self.shared.lifecycle.lock().retired.take();
        if let Some(mut strategy) = retired {
            strategy.join();
        }
    }

    fn failure_hook(&self) -> FailureHook {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |reason: String| {
            if let Some(shared) = shared.upgrade() {
                shared.fall_back(&reason);
            }
        })
    }
}

impl Drop for DeliveryEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("topic", &self.shared.topic)
            .field("state", &self.state())
            .finish()
    }
}
