//! Message store: the cache consumer that owns per-topic history.

mod store;

pub use store::{messages_key, watermark_key, MessageStore, MessageStoreConfig, MESSAGES_TAG};
