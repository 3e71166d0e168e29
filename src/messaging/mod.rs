//! Messaging collaborators: `PubSub` (subscribe + publish) for the
//! re-publish bus the Dispatcher listens on, and `Publisher`
//! (publish-only) for the writers and alarms buses.

mod memory;
mod redis_impl;

pub use memory::InMemoryBroker;
pub use redis_impl::RedisBroker;

use crate::error::Result;
use crate::model::Message;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Callback invoked for every message matching a subscription.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Channel + handler registration, plus publish. Used for the
/// re-publish bus the Message Dispatcher subscribes to.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<()>;
    async fn publish(&self, channel: &str, msg: Message) -> Result<()>;
}

/// Publish-only collaborator. Two instances exist in the engine: the
/// writers bus (`save_senml`) and the alarms bus (`send_alarm`).
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, msg: Message) -> Result<()>;
}
