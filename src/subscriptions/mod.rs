//! Topic subscriptions.
//!
//! Any number of callbacks may subscribe to a topic; they all share one
//! [`DeliveryEngine`](crate::delivery::DeliveryEngine), which exists only
//! while the topic has subscribers.
//!
//! # Example
//!
//! ```ignore
//! let token = registry.subscribe("g1", |message| println!("{}", message.content))?;
//! // ...
//! registry.unsubscribe(&token);
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{MessageCallback, SubscriptionId, SubscriptionToken};
