//! The backend boundary.
//!
//! Everything the delivery engine needs from the hosted backend goes
//! through [`Transport`]: fetching messages newer than a watermark,
//! attaching to a change stream, and sending. Timeouts and retries of
//! individual calls belong to the implementation.

mod memory;

pub use memory::InMemoryTransport;

use crate::error::Result;
use crate::types::{Message, OutgoingMessage, TopicId, Watermark};
use std::fmt;
use std::sync::Arc;

/// An event pushed by a change stream.
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    /// A changed backend document (normally a new message).
    Document(serde_json::Value),
    /// The channel failed; no further documents will arrive.
    Error(String),
}

/// Callback receiving change-stream events.
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// An attached change stream. Detaches when dropped.
pub struct ChangeStream {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeStream {
    /// Wrap the transport's detach action.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Stop receiving events. Idempotent.
    pub fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeStream")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Operations consumed from the hosted backend.
pub trait Transport: Send + Sync {
    /// Messages of `topic` at or after `watermark`. Implementations may
    /// return messages the caller has already seen; deduplication happens
    /// on admission.
    fn fetch_since(&self, topic: &TopicId, watermark: &Watermark) -> Result<Vec<Message>>;

    /// Attach `handler` to the backend's change notifications for `topic`.
    fn attach_change_stream(&self, topic: &TopicId, handler: ChangeHandler) -> Result<ChangeStream>;

    /// Store a new message and return it as the backend recorded it.
    fn send_message(&self, topic: &TopicId, outgoing: OutgoingMessage) -> Result<Message>;
}
