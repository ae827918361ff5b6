//! Process-local transport.

use super::{ChangeEvent, ChangeHandler, ChangeStream, Transport};
use crate::clock::{Clock, SystemClock};
use crate::error::{CourierError, Result};
use crate::types::{Message, MessageId, OutgoingMessage, TopicId, Watermark};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Stream {
    topic: TopicId,
    handler: ChangeHandler,
}

type StreamTable = Mutex<HashMap<u64, Stream>>;

/// A backend living entirely in this process.
///
/// Keeps every topic's messages in memory, pushes new ones to attached
/// change streams, and counts calls per topic so callers can observe how
/// much load they generate. Each operation can be made to fail on demand.
pub struct InMemoryTransport {
    clock: Arc<dyn Clock>,
    topics: RwLock<HashMap<TopicId, Vec<Message>>>,
    streams: Arc<StreamTable>,
    next_stream_id: AtomicU64,
    next_message_id: AtomicU64,
    fetch_calls: Mutex<HashMap<TopicId, u64>>,
    attach_calls: Mutex<HashMap<TopicId, u64>>,
    fail_fetch: AtomicBool,
    fail_attach: AtomicBool,
    fail_send: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Transport that stamps sent messages with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            topics: RwLock::new(HashMap::new()),
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_stream_id: AtomicU64::new(1),
            next_message_id: AtomicU64::new(1),
            fetch_calls: Mutex::new(HashMap::new()),
            attach_calls: Mutex::new(HashMap::new()),
            fail_fetch: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        }
    }

    /// Store a message written by someone else and notify change streams.
    pub fn publish(&self, message: Message) {
        {
            let mut topics = self.topics.write();
            let messages = topics.entry(message.topic.clone()).or_default();
            let at = messages.partition_point(|m| m.position() <= message.position());
            messages.insert(at, message.clone());
        }

        match serde_json::to_value(&message) {
            Ok(document) => self.emit(&message.topic, ChangeEvent::Document(document)),
            Err(e) => tracing::warn!(error = %e, "failed to encode change document"),
        }
    }

    /// Break every change stream attached to `topic`.
    pub fn fail_streams(&self, topic: &TopicId, reason: &str) {
        self.emit(topic, ChangeEvent::Error(reason.to_string()));
    }

    /// Deliver a raw change document to streams on `topic`.
    pub fn emit_document(&self, topic: &TopicId, document: serde_json::Value) {
        self.emit(topic, ChangeEvent::Document(document));
    }

    fn emit(&self, topic: &TopicId, event: ChangeEvent) {
        // Handlers run outside the lock so they may detach themselves
        let handlers: Vec<ChangeHandler> = self
            .streams
            .lock()
            .values()
            .filter(|stream| &stream.topic == topic)
            .map(|stream| Arc::clone(&stream.handler))
            .collect();

        for handler in handlers {
            handler(event.clone());
        }
    }

    pub fn set_fetch_failure(&self, failing: bool) {
        self.fail_fetch.store(failing, Ordering::SeqCst);
    }

    pub fn set_attach_failure(&self, failing: bool) {
        self.fail_attach.store(failing, Ordering::SeqCst);
    }

    pub fn set_send_failure(&self, failing: bool) {
        self.fail_send.store(failing, Ordering::SeqCst);
    }

    /// `fetch_since` calls made for `topic`.
    pub fn fetch_count(&self, topic: &TopicId) -> u64 {
        self.fetch_calls.lock().get(topic).copied().unwrap_or(0)
    }

    /// `attach_change_stream` calls made for `topic`.
    pub fn attach_count(&self, topic: &TopicId) -> u64 {
        self.attach_calls.lock().get(topic).copied().unwrap_or(0)
    }

    /// Change streams currently attached to `topic`.
    pub fn active_streams(&self, topic: &TopicId) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|stream| &stream.topic == topic)
            .count()
    }

    /// Everything stored for `topic`, in order.
    pub fn messages(&self, topic: &TopicId) -> Vec<Message> {
        self.topics.read().get(topic).cloned().unwrap_or_default()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryTransport {
    fn fetch_since(&self, topic: &TopicId, watermark: &Watermark) -> Result<Vec<Message>> {
        *self.fetch_calls.lock().entry(topic.clone()).or_default() += 1;

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(CourierError::Transport("backend unavailable".into()));
        }

        // Inclusive on the timestamp, like a `>=` backend query
        Ok(self
            .topics
            .read()
            .get(topic)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.timestamp >= watermark.last_timestamp)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn attach_change_stream(&self, topic: &TopicId, handler: ChangeHandler) -> Result<ChangeStream> {
        *self.attach_calls.lock().entry(topic.clone()).or_default() += 1;

        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(CourierError::ChangeStream("watch not permitted".into()));
        }

        let id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.lock().insert(
            id,
            Stream {
                topic: topic.clone(),
                handler,
            },
        );

        let streams = Arc::downgrade(&self.streams);
        Ok(ChangeStream::new(move || {
            if let Some(streams) = streams.upgrade() {
                streams.lock().remove(&id);
            }
        }))
    }

    fn send_message(&self, topic: &TopicId, outgoing: OutgoingMessage) -> Result<Message> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(CourierError::Transport("send rejected".into()));
        }

        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: MessageId::from(id),
            topic: topic.clone(),
            sender_id: outgoing.sender_id,
            sender_name: outgoing.sender_name,
            content: outgoing.content,
            kind: outgoing.kind,
            timestamp: self.clock.now(),
        };
        self.publish(message.clone());
        Ok(message)
    }
}
