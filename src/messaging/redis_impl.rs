use super::{MessageHandler, PubSub, Publisher};
use crate::error::{EngineError, Result};
use crate::model::Message;
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

/// Redis-backed `PubSub` + `Publisher`, using `psubscribe` with a
/// `tokio::select!` shutdown loop and `conn.publish(channel, message)`
/// for delivery.
pub struct RedisBroker {
    client: redis::Client,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RedisBroker {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(EngineError::from)?;
        Ok(RedisBroker {
            client,
            shutdown_tx: Mutex::new(None),
        })
    }

    /// Stop the background subscription loop started by `subscribe`.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }

    fn message_to_payload(msg: &Message) -> Result<String> {
        serde_json::to_string(msg).map_err(EngineError::from)
    }
}

#[async_trait]
impl PubSub for RedisBroker {
    async fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(EngineError::from)?;
        pubsub
            .psubscribe(pattern)
            .await
            .map_err(EngineError::from)?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        info!(pattern, "subscribed to re-publish bus pattern");

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    Some(raw) = stream.next() => {
                        let payload: String = match raw.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                error!(error = %e, "failed to read redis message payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<Message>(&payload) {
                            Ok(msg) => {
                                debug!(channel = raw.get_channel_name(), "dispatching redis message");
                                handler(msg).await;
                            }
                            Err(e) => error!(error = %e, "failed to decode message payload"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("redis subscriber shutting down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn publish(&self, channel: &str, msg: Message) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(EngineError::from)?;
        let payload = Self::message_to_payload(&msg)?;
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for RedisBroker {
    async fn publish(&self, channel: &str, msg: Message) -> Result<()> {
        PubSub::publish(self, channel, msg).await
    }
}
