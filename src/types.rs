//! Core types shared by the cache, the message store and delivery.

use crate::error::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(duration.as_millis() as i64)
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// This timestamp shifted forward by `duration` (saturating).
    pub fn after(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identifier of a message stream (a chat group).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    /// Build a topic id, rejecting empty or whitespace-only names.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CourierError::InvalidTopic(name.as_ref().to_string()));
        }
        Ok(TopicId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({})", self.0)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-assigned message identifier.
///
/// Ids that both parse as unsigned integers compare numerically; anything
/// else compares as plain strings.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        MessageId(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId(id.to_string())
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message payload kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
    #[serde(other)]
    Other,
}

/// A chat message. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub topic: TopicId,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub timestamp: Timestamp,
}

impl Message {
    /// Position of this message in the per-topic order.
    pub fn position(&self) -> (Timestamp, &MessageId) {
        (self.timestamp, &self.id)
    }
}

/// Per-topic marker of the newest admitted message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub last_timestamp: Timestamp,
    pub last_id: Option<MessageId>,
}

impl Watermark {
    /// The beginning of time: every message advances it.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn at(last_timestamp: Timestamp, last_id: impl Into<MessageId>) -> Self {
        Self {
            last_timestamp,
            last_id: Some(last_id.into()),
        }
    }

    /// Whether `message` lies strictly after this watermark.
    ///
    /// Later timestamps always advance; equal timestamps advance only with a
    /// greater id. A watermark without an id sits below every id.
    pub fn is_advanced_by(&self, message: &Message) -> bool {
        match message.timestamp.cmp(&self.last_timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match &self.last_id {
                Some(last_id) => &message.id > last_id,
                None => true,
            },
        }
    }

    /// Move forward to `message` if it lies after the current position.
    /// Returns whether the watermark moved.
    pub fn advance_to(&mut self, message: &Message) -> bool {
        if !self.is_advanced_by(message) {
            return false;
        }
        self.last_timestamp = message.timestamp;
        self.last_id = Some(message.id.clone());
        true
    }
}

/// Request body handed to the transport when sending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Optional metadata for a send.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub kind: MessageKind,
    pub sender_id: String,
    pub sender_name: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SendOptions {
    pub fn from_sender(sender_id: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub(crate) fn into_outgoing(self, content: String) -> OutgoingMessage {
        OutgoingMessage {
            content,
            kind: self.kind,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_message(topic: &str, id: u64, timestamp: i64) -> Message {
    Message {
        id: MessageId::from(id),
        topic: TopicId::new(topic).unwrap(),
        sender_id: "u1".to_string(),
        sender_name: "Alice".to_string(),
        content: format!("message {}", id),
        kind: MessageKind::Text,
        timestamp: Timestamp(timestamp),
    }
}
