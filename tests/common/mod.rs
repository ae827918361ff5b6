//! Shared helpers for integration tests.

#![allow(dead_code)]

use courier::{
    Courier, CourierConfig, DeliveryConfig, HostInfo, InMemoryTransport, Message, MessageId,
    MessageKind, Timestamp, TopicId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn topic(name: &str) -> TopicId {
    TopicId::new(name).unwrap()
}

pub fn message(topic_name: &str, id: u64, timestamp: i64) -> Message {
    Message {
        id: MessageId::from(id),
        topic: topic(topic_name),
        sender_id: "u2".to_string(),
        sender_name: "Bob".to_string(),
        content: format!("message {}", id),
        kind: MessageKind::Text,
        timestamp: Timestamp(timestamp),
    }
}

/// Poll `condition` for up to two seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Config polling every 10ms.
pub fn fast_config() -> CourierConfig {
    CourierConfig::default()
        .with_delivery(DeliveryConfig::default().with_poll_interval(Duration::from_millis(10)))
}

pub fn client(transport: Arc<InMemoryTransport>, host: HostInfo) -> Courier {
    Courier::new(fast_config(), transport, Arc::new(host)).unwrap()
}

/// Collects delivered message ids.
#[derive(Clone, Default)]
pub struct Inbox {
    ids: Arc<Mutex<Vec<String>>>,
}

impl Inbox {
    pub fn callback(&self) -> impl Fn(&Message) + Send + Sync + 'static {
        let ids = self.ids.clone();
        move |message: &Message| ids.lock().push(message.id.0.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }
}
