//! The assembled client.

use crate::cache::{AppLifecycle, CacheEngine, SweeperHandle};
use crate::capability::{CapabilityDetector, HostProbe, TransportCapability};
use crate::clock::{Clock, SystemClock};
use crate::config::CourierConfig;
use crate::error::{CourierError, Result};
use crate::messages::MessageStore;
use crate::storage::{DurableStorage, FileStorage};
use crate::subscriptions::{SubscriptionRegistry, SubscriptionToken};
use crate::transport::Transport;
use crate::types::{Message, SendOptions, TopicId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// The eventual outcome of [`Courier::send`].
pub struct PendingSend {
    receiver: Receiver<Result<Message>>,
}

impl PendingSend {
    fn resolved(result: Result<Message>) -> Self {
        let (sender, receiver) = bounded(1);
        let _ = sender.send(result);
        Self { receiver }
    }

    /// Block until the backend answers.
    pub fn wait(self) -> Result<Message> {
        self.receiver
            .recv()
            .unwrap_or(Err(CourierError::SendCancelled))
    }

    /// Block for at most `timeout`. `None` if no answer arrived in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Message>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(CourierError::SendCancelled)),
        }
    }

    /// The answer, if it already arrived.
    pub fn try_result(&self) -> Option<Result<Message>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CourierError::SendCancelled)),
        }
    }
}

/// Message delivery and caching for one client process.
///
/// Owns the cache (and its sweeper), the message store, the capability
/// detector and the subscription registry. Everything is shared through
/// `Arc`, so the pieces remain usable on their own.
///
/// # Example
///
/// ```ignore
/// let courier = Courier::new(CourierConfig::from_env()?, transport, Arc::new(EnvHostProbe))?;
///
/// let token = courier.subscribe("g1", |m| println!("{}: {}", m.sender_name, m.content))?;
/// let sent = courier.send("g1", "hello", SendOptions::from_sender("u1", "Alice")).wait()?;
/// courier.unsubscribe(&token);
/// ```
pub struct Courier {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheEngine>,
    store: Arc<MessageStore>,
    detector: Arc<CapabilityDetector>,
    registry: SubscriptionRegistry,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl Courier {
    /// Build a client. Opens a file-backed cache mirror when
    /// `config.storage_path` is set, otherwise caches in memory only.
    pub fn new(
        config: CourierConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn HostProbe>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = match &config.storage_path {
            Some(path) => {
                let storage: Arc<dyn DurableStorage> = Arc::new(FileStorage::open(path)?);
                CacheEngine::with_storage(config.cache.clone(), storage, clock)
            }
            None => CacheEngine::with_clock(config.cache.clone(), clock),
        };
        Self::assemble(config, transport, probe, cache)
    }

    /// Build a client over an explicit durable store and clock.
    pub fn with_storage(
        config: CourierConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn HostProbe>,
        storage: Arc<dyn DurableStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache = CacheEngine::with_storage(config.cache.clone(), storage, clock);
        Self::assemble(config, transport, probe, cache)
    }

    fn assemble(
        config: CourierConfig,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn HostProbe>,
        cache: CacheEngine,
    ) -> Result<Self> {
        let cache = Arc::new(cache);
        let sweeper = cache.start_sweeper()?;
        let store = Arc::new(MessageStore::new(Arc::clone(&cache), config.messages.clone()));
        let detector = Arc::new(CapabilityDetector::new(probe, config.detector.clone()));
        let registry = SubscriptionRegistry::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&detector),
            config.delivery.clone(),
        );

        debug!(
            cached_entries = cache.len(),
            poll_interval_ms = config.delivery.poll_interval.as_millis() as u64,
            "courier ready"
        );

        Ok(Self {
            transport,
            cache,
            store,
            detector,
            registry,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    // --- Delivery ---

    /// Call `on_message` with every new message of `topic` until
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, topic: impl AsRef<str>, on_message: F) -> Result<SubscriptionToken>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, on_message)
    }

    /// Returns whether the subscription was still active.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        self.registry.unsubscribe(token)
    }

    /// Send `content` to `topic` on a background thread.
    ///
    /// The sent message is not recorded locally; it reaches subscribers,
    /// the sender included, through normal delivery.
    pub fn send(&self, topic: impl AsRef<str>, content: impl Into<String>, options: SendOptions) -> PendingSend {
        let topic = match TopicId::new(topic) {
            Ok(topic) => topic,
            Err(e) => return PendingSend::resolved(Err(e)),
        };
        let outgoing = options.into_outgoing(content.into());
        let transport = Arc::clone(&self.transport);
        let (sender, receiver) = bounded(1);

        let spawned = thread::Builder::new()
            .name("courier-send".into())
            .spawn(move || {
                let result = transport.send_message(&topic, outgoing);
                match &result {
                    Ok(message) => debug!(topic = %topic, id = %message.id, "message sent"),
                    Err(e) => warn!(topic = %topic, error = %e, "send failed"),
                }
                let _ = sender.send(result);
            });

        match spawned {
            Ok(_) => PendingSend { receiver },
            Err(e) => PendingSend::resolved(Err(e.into())),
        }
    }

    /// Up to `limit` of the newest locally stored messages of `topic`,
    /// oldest first. Never touches the backend.
    pub fn get_cached(&self, topic: impl AsRef<str>, limit: usize) -> Vec<Message> {
        match TopicId::new(topic) {
            Ok(topic) => self.store.recent(&topic, limit),
            Err(_) => Vec::new(),
        }
    }

    // --- Accessors ---

    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    pub fn messages(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn capability(&self) -> TransportCapability {
        self.detector.detect()
    }

    // --- Lifecycle ---

    /// Forward a host visibility change to the cache.
    pub fn on_lifecycle(&self, event: AppLifecycle) {
        debug!(?event, "app lifecycle change");
        self.cache.on_lifecycle(event);
    }

    /// Stop all delivery and the sweeper, then flush the durable mirror.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
            self.cache.sync_to_storage();
            debug!("courier shut down");
        }
    }
}

impl Drop for Courier {
    fn drop(&mut self) {
        self.shutdown();
    }
}
