//! Subscription handles and per-topic subscriber lists.

use crate::delivery::MessageSink;
use crate::types::{Message, TopicId};
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Callback invoked with every new message of a topic.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Unique subscription identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Returned by `subscribe`; hand it back to `unsubscribe`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    pub(crate) id: SubscriptionId,
    pub(crate) topic: TopicId,
}

impl SubscriptionToken {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &TopicId {
        &self.topic
    }
}

/// The callbacks subscribed to one topic.
///
/// Delivery iterates a snapshot, so callbacks may subscribe or unsubscribe
/// (themselves included) while being notified. A panicking callback is
/// logged and does not keep the message from the others.
///
/// The list owns its callbacks. They, and whatever they capture, are
/// released when their subscription is removed, so dropping a
/// [`SubscriptionToken`] without unsubscribing keeps the callback alive.
pub(crate) struct SubscriberList {
    topic: TopicId,
    callbacks: RwLock<Vec<(SubscriptionId, MessageCallback)>>,
}

impl SubscriberList {
    pub fn new(topic: TopicId) -> Self {
        Self {
            topic,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, id: SubscriptionId, callback: MessageCallback) {
        self.callbacks.write().push((id, callback));
    }

    /// Remove `id`. Returns whether it was present.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

impl MessageSink for SubscriberList {
    fn deliver(&self, message: &Message) {
        let snapshot: Vec<(SubscriptionId, MessageCallback)> = self
            .callbacks
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                warn!(
                    topic = %self.topic,
                    subscription = %id,
                    message = %message.id,
                    "subscriber callback panicked"
                );
            }
        }
    }
}
