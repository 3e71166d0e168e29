use super::{MessageHandler, PubSub, Publisher};
use crate::error::Result;
use crate::model::Message;
use async_trait::async_trait;
use std::sync::RwLock;

struct Subscription {
    pattern: String,
    handler: MessageHandler,
}

/// In-memory broker used by unit and integration tests in place of
/// Redis. Subscriptions support a single trailing `*` wildcard,
/// matching the glob semantics `redis::psubscribe` uses for the
/// teacher's `modsrv:outputs:*` style channel patterns.
#[derive(Default)]
pub struct InMemoryBroker {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        InMemoryBroker::default()
    }
}

fn matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[async_trait]
impl PubSub for InMemoryBroker {
    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<()> {
        self.subscriptions
            .write()
            .expect("broker lock poisoned")
            .push(Subscription {
                pattern: pattern.to_string(),
                handler,
            });
        Ok(())
    }

    async fn publish(&self, channel: &str, msg: Message) -> Result<()> {
        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .read()
            .expect("broker lock poisoned")
            .iter()
            .filter(|s| matches(&s.pattern, channel))
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            tokio::spawn(handler(msg.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, channel: &str, msg: Message) -> Result<()> {
        PubSub::publish(self, channel, msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn msg(channel: &str) -> Message {
        Message {
            publisher: "dev1".to_string(),
            channel: channel.to_string(),
            subtopic: String::new(),
            payload: b"x".to_vec(),
            created: 0,
            domain: String::new(),
            protocol: String::new(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn exact_pattern_matches_only_that_channel() {
        let broker = InMemoryBroker::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        broker
            .subscribe(
                "c1",
                Arc::new(move |_| {
                    let counted = counted.clone();
                    Box::pin(async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        PubSub::publish(&broker, "c1", msg("c1")).await.unwrap();
        PubSub::publish(&broker, "c2", msg("c2")).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wildcard_pattern_matches_prefix() {
        let broker = InMemoryBroker::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        broker
            .subscribe(
                "channels.*",
                Arc::new(move |_| {
                    let counted = counted.clone();
                    Box::pin(async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        PubSub::publish(&broker, "channels.c1", msg("channels.c1")).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
