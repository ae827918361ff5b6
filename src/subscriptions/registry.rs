//! Multiplexes subscribers onto one delivery engine per topic.

use super::types::{MessageCallback, SubscriberList, SubscriptionId, SubscriptionToken};
use crate::capability::CapabilityDetector;
use crate::delivery::{DeliveryConfig, DeliveryEngine, EngineState};
use crate::error::Result;
use crate::messages::MessageStore;
use crate::transport::Transport;
use crate::types::{Message, TopicId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct TopicEntry {
    engine: Arc<DeliveryEngine>,
    subscribers: Arc<SubscriberList>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<TopicId, TopicEntry>,
    tokens: HashMap<SubscriptionId, TopicId>,
}

/// Owns every delivery engine.
///
/// The first subscriber of a topic creates and starts its engine; later
/// subscribers share it. When the last one leaves, the engine is stopped
/// and discarded. Subscribing again later builds a fresh engine that
/// resumes from the watermark kept in the [`MessageStore`].
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    store: Arc<MessageStore>,
    detector: Arc<CapabilityDetector>,
    config: DeliveryConfig,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<MessageStore>,
        detector: Arc<CapabilityDetector>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            transport,
            store,
            detector,
            config,
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Register `on_message` for `topic`.
    ///
    /// Fails only for a blank topic, or when no delivery could be started
    /// for a new topic at all.
    pub fn subscribe<F>(&self, topic: impl AsRef<str>, on_message: F) -> Result<SubscriptionToken>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let topic = TopicId::new(topic)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let callback: MessageCallback = Arc::new(on_message);
        let token = SubscriptionToken {
            id,
            topic: topic.clone(),
        };

        let new_engine = {
            let mut inner = self.inner.lock();
            inner.tokens.insert(id, topic.clone());

            if let Some(entry) = inner.topics.get(&topic) {
                entry.subscribers.add(id, callback);
                debug!(topic = %topic, subscription = %id, subscribers = entry.subscribers.len(), "joined existing topic");
                None
            } else {
                // Subscriber goes in before the engine runs, so the first
                // poll cycle already reaches it.
                let subscribers = Arc::new(SubscriberList::new(topic.clone()));
                subscribers.add(id, callback);
                let engine = Arc::new(DeliveryEngine::new(
                    topic.clone(),
                    Arc::clone(&self.transport),
                    Arc::clone(&self.store),
                    subscribers.clone(),
                    self.detector.detect(),
                    self.config.clone(),
                ));
                inner.topics.insert(
                    topic.clone(),
                    TopicEntry {
                        engine: Arc::clone(&engine),
                        subscribers,
                    },
                );
                debug!(topic = %topic, subscription = %id, "created delivery engine");
                Some(engine)
            }
        };

        // Started outside the lock; an engine stopped meanwhile stays stopped.
        if let Some(engine) = new_engine {
            if let Err(e) = engine.start() {
                self.unsubscribe(&token);
                return Err(e);
            }
        }

        Ok(token)
    }

    /// Remove exactly the callback registered under `token`. Returns
    /// whether it was still registered.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut inner = self.inner.lock();
        let topic = match inner.tokens.remove(&token.id) {
            Some(topic) => topic,
            None => return false,
        };

        let now_empty = match inner.topics.get(&topic) {
            Some(entry) => {
                entry.subscribers.remove(token.id);
                entry.subscribers.is_empty()
            }
            None => false,
        };

        if now_empty {
            if let Some(entry) = inner.topics.remove(&topic) {
                entry.engine.stop();
                debug!(topic = %topic, "last subscriber left; engine stopped");
            }
        }
        true
    }

    /// Topics with a live engine.
    pub fn topic_count(&self) -> usize {
        self.inner.lock().topics.len()
    }

    pub fn topics(&self) -> Vec<TopicId> {
        self.inner.lock().topics.keys().cloned().collect()
    }

    pub fn subscriber_count(&self, topic: &TopicId) -> usize {
        self.inner
            .lock()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// State of the topic's engine, if one exists.
    pub fn engine_state(&self, topic: &TopicId) -> Option<EngineState> {
        let engine = self
            .inner
            .lock()
            .topics
            .get(topic)
            .map(|entry| Arc::clone(&entry.engine))?;
        Some(engine.state())
    }

    /// Stop every engine, forget every subscription, and wait for the
    /// engines' poll threads to exit. Not for use inside a subscriber
    /// callback.
    pub fn shutdown(&self) {
        let engines: Vec<Arc<DeliveryEngine>> = {
            let mut inner = self.inner.lock();
            inner.tokens.clear();
            inner
                .topics
                .drain()
                .map(|(topic, entry)| {
                    entry.engine.stop();
                    debug!(topic = %topic, "engine stopped on shutdown");
                    entry.engine
                })
                .collect()
        };

        for engine in engines {
            engine.join();
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
