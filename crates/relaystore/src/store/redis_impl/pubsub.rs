//! Redis pub/sub implementation.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use relaystore_core::store::{
    ChannelMessage, ChannelPubSub, MessageListener, Result, StoreError, Subscription,
};

use super::error::map_redis_error;
use super::RedisStore;

#[async_trait]
impl ChannelPubSub for RedisStore {
    async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        let mut conn = self.shared.connection().await?;

        conn.publish(channel, message)
            .await
            .map_err(|e| StoreError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, channel: &str, listener: MessageListener) -> Result<Subscription> {
        self.shared.ensure_open()?;

        // Subscribe before spawning so the caller never races its own publish
        let mut pubsub = tokio::time::timeout(
            self.shared.connect_timeout,
            self.shared.client.get_async_pubsub(),
        )
        .await
        .map_err(|_| StoreError::ConnectionFailed("timed out opening pub/sub connection".into()))?
        .map_err(map_redis_error)?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StoreError::SubscribeFailed(e.to_string()))?;

        // Re-check once the shutdown receiver exists: a shutdown that landed
        // while connecting would otherwise never reach the forwarding task.
        let shutdown_rx = self.shared.shutdown_tx.subscribe();
        self.shared.ensure_open()?;
        let task = tokio::spawn(run_subscription_loop(
            pubsub,
            channel.to_string(),
            listener,
            shutdown_rx,
        ));

        tracing::debug!("Create subscription to {} redis channel", channel);
        Ok(Subscription::new(channel, task))
    }
}

/// Forwards messages from a dedicated pub/sub connection to the listener.
async fn run_subscription_loop(
    mut pubsub: redis::aio::PubSub,
    channel: String,
    listener: MessageListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut stream = pubsub.on_message();

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(msg) => match msg.get_payload::<String>() {
                    Ok(payload) => listener(ChannelMessage::new(msg.get_channel_name(), payload)),
                    Err(e) => {
                        tracing::warn!(
                            channel = %channel,
                            error = %e,
                            "Dropping message with non-string payload"
                        );
                    }
                },
                None => {
                    tracing::info!("Redis subscription stream ended for channel {}", channel);
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                tracing::debug!("Closing Redis subscription for channel {}", channel);
                break;
            }
        }
    }
}
