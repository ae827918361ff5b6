//! Per-topic message windows with watermark deduplication.

use crate::cache::{CacheEngine, SetOptions};
use crate::types::{Message, MessageId, TopicId, Watermark};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{trace, warn};

/// Cache tag carried by every message-store entry.
pub const MESSAGES_TAG: &str = "messages";

/// Message store configuration.
#[derive(Clone, Debug)]
pub struct MessageStoreConfig {
    /// Most recent messages kept per topic.
    /// Default: 100
    pub window_size: usize,
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

impl MessageStoreConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }
}

/// Cache key of a topic's recent-message window.
pub fn messages_key(topic: &TopicId) -> String {
    format!("messages_{}", topic)
}

/// Cache key of a topic's watermark.
pub fn watermark_key(topic: &TopicId) -> String {
    format!("watermark_{}", topic)
}

/// Working copy of one topic.
#[derive(Default)]
struct TopicWindow {
    messages: VecDeque<Message>,
    ids: HashSet<MessageId>,
    watermark: Watermark,
}

/// Holds the ordered recent-message window and watermark of each topic.
///
/// [`admit`](Self::admit) is the only way in and the single deduplication
/// point. Every admission is written through to the cache under persistent
/// keys, so a restarted process resumes from the last watermark instead of
/// replaying the whole history.
pub struct MessageStore {
    cache: Arc<CacheEngine>,
    config: MessageStoreConfig,
    topics: Mutex<HashMap<TopicId, TopicWindow>>,
}

impl MessageStore {
    pub fn new(cache: Arc<CacheEngine>, config: MessageStoreConfig) -> Self {
        Self {
            cache,
            config,
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    /// Record `message` if it is new for its topic.
    ///
    /// Returns false, without storing anything, when the id was already
    /// recorded or the message does not advance the watermark.
    pub fn admit(&self, message: Message) -> bool {
        let mut topics = self.topics.lock();
        let topic = message.topic.clone();
        let window = Self::window_mut(&self.cache, &mut topics, &topic);

        if window.ids.contains(&message.id) || !window.watermark.advance_to(&message) {
            trace!(topic = %topic, id = %message.id, "dropping already-seen message");
            return false;
        }

        window.ids.insert(message.id.clone());
        window.messages.push_back(message);

        let cap = self.config.window_size.max(1);
        while window.messages.len() > cap {
            if let Some(oldest) = window.messages.pop_front() {
                window.ids.remove(&oldest.id);
            }
        }

        self.write_through(&topic, window);
        true
    }

    /// Up to `limit` of the newest stored messages, oldest first.
    pub fn recent(&self, topic: &TopicId, limit: usize) -> Vec<Message> {
        let mut topics = self.topics.lock();
        let window = Self::window_mut(&self.cache, &mut topics, topic);
        let skip = window.messages.len().saturating_sub(limit);
        window.messages.iter().skip(skip).cloned().collect()
    }

    /// Newest admitted position for `topic`.
    pub fn watermark(&self, topic: &TopicId) -> Watermark {
        let mut topics = self.topics.lock();
        Self::window_mut(&self.cache, &mut topics, topic)
            .watermark
            .clone()
    }

    /// Topics with a working copy in memory.
    pub fn topics(&self) -> Vec<TopicId> {
        self.topics.lock().keys().cloned().collect()
    }

    /// Working copy of `topic`, hydrated from the cache on first touch.
    fn window_mut<'a>(
        cache: &CacheEngine,
        topics: &'a mut HashMap<TopicId, TopicWindow>,
        topic: &TopicId,
    ) -> &'a mut TopicWindow {
        topics
            .entry(topic.clone())
            .or_insert_with(|| Self::hydrate(cache, topic))
    }

    fn hydrate(cache: &CacheEngine, topic: &TopicId) -> TopicWindow {
        let messages: VecDeque<Message> = cache.get(&messages_key(topic)).unwrap_or_default();
        let mut watermark: Watermark = cache.get(&watermark_key(topic)).unwrap_or_default();

        // Guard against a window persisted after its watermark
        for message in &messages {
            watermark.advance_to(message);
        }

        let ids = messages.iter().map(|m| m.id.clone()).collect();
        TopicWindow {
            messages,
            ids,
            watermark,
        }
    }

    fn write_through(&self, topic: &TopicId, window: &TopicWindow) {
        let options = || {
            SetOptions::new()
                .persistent()
                .tag(MESSAGES_TAG)
                .tag(format!("topic:{}", topic))
        };

        let result = self
            .cache
            .set(&messages_key(topic), &window.messages, options())
            .and_then(|_| self.cache.set(&watermark_key(topic), &window.watermark, options()));

        if let Err(e) = result {
            warn!(topic = %topic, error = %e, "failed to cache message window");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::types::{test_message, Timestamp};

    fn store(window_size: usize) -> MessageStore {
        MessageStore::new(
            Arc::new(CacheEngine::new(CacheConfig::default())),
            MessageStoreConfig::default().with_window_size(window_size),
        )
    }

    fn topic(name: &str) -> TopicId {
        TopicId::new(name).unwrap()
    }

    #[test]
    fn test_admit_dedups_by_id() {
        let store = store(10);
        assert!(store.admit(test_message("g1", 1, 100)));
        assert!(!store.admit(test_message("g1", 1, 100)));
        assert_eq!(store.recent(&topic("g1"), 10).len(), 1);
    }

    #[test]
    fn test_admit_rejects_positions_behind_watermark() {
        let store = store(10);
        assert!(store.admit(test_message("g1", 5, 100)));
        assert!(!store.admit(test_message("g1", 4, 100)));
        assert!(!store.admit(test_message("g1", 9, 99)));
        assert!(store.admit(test_message("g1", 6, 100)));

        assert_eq!(store.watermark(&topic("g1")), Watermark::at(Timestamp(100), 6u64));
    }

    #[test]
    fn test_topics_are_independent() {
        let store = store(10);
        assert!(store.admit(test_message("g1", 1, 100)));
        assert!(store.admit(test_message("g2", 1, 100)));
        assert_eq!(store.watermark(&topic("g3")), Watermark::zero());

        let mut topics = store.topics();
        topics.sort();
        assert_eq!(topics, vec![topic("g1"), topic("g2"), topic("g3")]);
    }

    #[test]
    fn test_window_cap_drops_oldest() {
        let store = store(3);
        for i in 1..=5 {
            assert!(store.admit(test_message("g1", i, 100 + i as i64)));
        }

        let ids: Vec<String> = store
            .recent(&topic("g1"), 10)
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, vec!["3", "4", "5"]);

        // The watermark still rejects evicted history
        assert!(!store.admit(test_message("g1", 1, 101)));
    }

    #[test]
    fn test_recent_limit_returns_newest_in_order() {
        let store = store(10);
        for i in 1..=4 {
            store.admit(test_message("g1", i, i as i64));
        }
        let ids: Vec<String> = store
            .recent(&topic("g1"), 2)
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, vec!["3", "4"]);
        assert!(store.recent(&topic("g1"), 0).is_empty());
    }

    #[test]
    fn test_hydrates_from_cache() {
        let cache = Arc::new(CacheEngine::new(CacheConfig::default()));
        {
            let first = MessageStore::new(cache.clone(), MessageStoreConfig::default());
            first.admit(test_message("g1", 1, 100));
            first.admit(test_message("g1", 2, 101));
        }
        assert!(cache.has("messages_g1"));
        assert!(cache.has("watermark_g1"));

        let second = MessageStore::new(cache, MessageStoreConfig::default());
        assert_eq!(second.watermark(&topic("g1")), Watermark::at(Timestamp(101), 2u64));
        assert_eq!(second.recent(&topic("g1"), 10).len(), 2);
        assert!(!second.admit(test_message("g1", 2, 101)));
    }

    #[test]
    fn test_corrupt_cached_window_treated_as_empty() {
        let cache = Arc::new(CacheEngine::new(CacheConfig::default()));
        cache
            .set("messages_g1", &"garbage", SetOptions::new())
            .unwrap();

        let store = MessageStore::new(cache.clone(), MessageStoreConfig::default());
        assert!(store.recent(&topic("g1"), 10).is_empty());
        assert!(!cache.has("messages_g1"));
    }
}
