//! Change-stream delivery.

use super::poll::poll_once;
use super::{DeliveryStrategy, Dispatcher, StrategyKind};
use crate::error::{CourierError, Result};
use crate::transport::{ChangeEvent, ChangeHandler, ChangeStream, Transport};
use crate::types::{Message, MessageId, MessageKind, Timestamp, TopicId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Invoked with the reason when an attached stream breaks.
pub(crate) type FailureHook = Arc<dyn Fn(String) + Send + Sync>;

/// Backend document shape. Accepts the store's own camelCase encoding as
/// well as the backend's `_id`/`groupId`/`createTime` field names.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeDocument {
    #[serde(alias = "_id")]
    id: MessageId,
    #[serde(default, alias = "groupId")]
    topic: Option<String>,
    #[serde(default)]
    sender_id: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "type", default)]
    kind: MessageKind,
    #[serde(alias = "createTime")]
    timestamp: Timestamp,
}

/// Convert a change-stream document into a message of `topic`.
pub fn message_from_document(topic: &TopicId, document: serde_json::Value) -> Result<Message> {
    let doc: ChangeDocument = serde_json::from_value(document)
        .map_err(|e| CourierError::Deserialization(e.to_string()))?;

    if let Some(other) = doc.topic.as_deref() {
        if other.trim() != topic.as_str() {
            return Err(CourierError::InvalidFormat(format!(
                "document belongs to topic {}",
                other
            )));
        }
    }

    Ok(Message {
        id: doc.id,
        topic: topic.clone(),
        sender_id: doc.sender_id,
        sender_name: doc.sender_name,
        content: doc.content,
        kind: doc.kind,
        timestamp: doc.timestamp,
    })
}

/// Delivers messages pushed by the backend's change stream.
///
/// Starting attaches the stream first and then fetches once from the
/// watermark, so messages written while nobody listened are not skipped.
pub struct PushStrategy {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    on_failure: FailureHook,
    stream: Option<ChangeStream>,
}

impl PushStrategy {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        on_failure: FailureHook,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            on_failure,
            stream: None,
        }
    }

    fn handler(&self) -> ChangeHandler {
        let dispatcher = Arc::clone(&self.dispatcher);
        let on_failure = Arc::clone(&self.on_failure);

        Arc::new(move |event: ChangeEvent| match event {
            ChangeEvent::Document(document) => {
                match message_from_document(dispatcher.topic(), document) {
                    Ok(message) => {
                        dispatcher.dispatch(message);
                    }
                    Err(e) => {
                        warn!(topic = %dispatcher.topic(), error = %e, "skipping malformed change document");
                    }
                }
            }
            ChangeEvent::Error(reason) => on_failure(reason),
        })
    }
}

impl DeliveryStrategy for PushStrategy {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let topic = self.dispatcher.topic().clone();
        let mut stream = self.transport.attach_change_stream(&topic, self.handler())?;
        debug!(topic = %topic, "attached change stream");

        match poll_once(self.transport.as_ref(), &self.dispatcher) {
            Ok(count) => {
                debug!(topic = %topic, count, "caught up from watermark");
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                // Polling covers the gap instead
                stream.detach();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.detach();
            debug!(topic = %self.dispatcher.topic(), "detached change stream");
        }
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Push
    }
}
