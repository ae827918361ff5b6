//! Admission and fan-out gate shared by a topic's strategies.

use super::MessageSink;
use crate::messages::MessageStore;
use crate::types::{Message, TopicId, Watermark};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Serializes admission and fan-out for one topic.
///
/// Whichever strategy is running hands every candidate message here. The
/// gate guarantees that subscribers see messages in exactly the order they
/// were admitted, even while a push channel and a poll loop overlap during
/// fallback.
pub(crate) struct Dispatcher {
    topic: TopicId,
    store: Arc<MessageStore>,
    sink: Arc<dyn MessageSink>,
    gate: Mutex<()>,
    stopped: AtomicBool,
}

impl Dispatcher {
    pub fn new(topic: TopicId, store: Arc<MessageStore>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            topic,
            store,
            sink,
            gate: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    pub fn watermark(&self) -> Watermark {
        self.store.watermark(&self.topic)
    }

    /// Admit `message` and, unless stopped, fan it out.
    ///
    /// Returns whether subscribers were notified. Once stopped, new
    /// messages are still admitted (the watermark keeps advancing) but
    /// nobody is notified.
    pub fn dispatch(&self, message: Message) -> bool {
        if message.topic != self.topic {
            warn!(
                topic = %self.topic,
                other = %message.topic,
                "ignoring message addressed to another topic"
            );
            return false;
        }

        let _gate = self.gate.lock();
        let notify = if self.is_stopped() {
            None
        } else {
            Some(message.clone())
        };

        if !self.store.admit(message) {
            return false;
        }

        match notify {
            Some(message) => {
                self.sink.deliver(&message);
                true
            }
            None => false,
        }
    }

    /// Dispatch a batch in `(timestamp, id)` order. Returns how many were
    /// delivered.
    pub fn dispatch_batch(&self, mut messages: Vec<Message>) -> usize {
        messages.sort_by(|a, b| a.position().cmp(&b.position()));
        messages
            .into_iter()
            .filter(|message| self.dispatch(message.clone()))
            .count()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::{dispatcher, RecordingSink};
    use crate::types::{test_message, Timestamp};

    #[test]
    fn test_batch_is_delivered_in_position_order() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher("g1", sink.clone());

        let delivered = dispatcher.dispatch_batch(vec![
            test_message("g1", 3, 101),
            test_message("g1", 2, 100),
            test_message("g1", 1, 100),
            test_message("g1", 2, 100),
        ]);
        assert_eq!(delivered, 3);
        assert_eq!(sink.ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_stopped_dispatcher_admits_silently() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher("g1", sink.clone());

        dispatcher.stop();
        assert!(!dispatcher.dispatch(test_message("g1", 1, 100)));
        assert!(sink.ids().is_empty());
        assert_eq!(dispatcher.watermark(), Watermark::at(Timestamp(100), 1u64));
    }

    #[test]
    fn test_foreign_topic_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher("g1", sink.clone());

        assert!(!dispatcher.dispatch(test_message("g2", 1, 100)));
        assert_eq!(dispatcher.watermark(), Watermark::zero());
    }
}
