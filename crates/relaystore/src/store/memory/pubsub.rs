//! In-memory pub/sub implementation.
//!
//! Each channel name maps to a tokio broadcast channel; every subscription
//! drains its own receiver on a background task and hands messages to the
//! listener.

use async_trait::async_trait;
use tokio::sync::broadcast;

use relaystore_core::store::{
    ChannelMessage, ChannelPubSub, MessageListener, Result, Subscription,
};

use super::MemoryStore;

/// Channel capacity for pub/sub messages.
const CHANNEL_CAPACITY: usize = 100;

impl MemoryStore {
    /// Gets or creates a broadcast channel for the given name.
    async fn get_or_create_channel(&self, channel: &str) -> broadcast::Sender<ChannelMessage> {
        // Try read lock first to avoid write contention
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(channel) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write().await;

        // Double-check after acquiring write lock
        if let Some(sender) = channels.get(channel) {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(channel.to_string(), sender.clone());
        sender
    }
}

#[async_trait]
impl ChannelPubSub for MemoryStore {
    async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        self.ensure_open()?;

        // Look the channel up without creating it: nobody can be listening
        // on a channel that was never subscribed to.
        let sender = self.channels.read().await.get(channel).cloned();
        let receivers = sender
            .and_then(|s| s.send(ChannelMessage::new(channel, message)).ok())
            .unwrap_or(0);

        Ok(receivers as u64)
    }

    async fn subscribe(&self, channel: &str, listener: MessageListener) -> Result<Subscription> {
        self.ensure_open()?;

        let mut receiver = self.get_or_create_channel(channel).await.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // A shutdown racing the channel lookup must not leave a live task
        self.ensure_open()?;
        let name = channel.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(message) => listener(message),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(channel = %name, skipped, "Subscriber lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!(channel = %name, "In-memory subscription ended");
        });

        tracing::debug!("Create subscription to {} in-memory channel", channel);
        Ok(Subscription::new(channel, task))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use relaystore_core::store::{StoreBackend, StoreError};

    use super::*;

    fn forwarding_listener() -> (MessageListener, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: MessageListener = Arc::new(move |message| {
            let _ = tx.send(message);
        });
        (listener, rx)
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let store = MemoryStore::new();
        let (listener, mut rx) = forwarding_listener();

        let _subscription = store.subscribe("room-1", listener).await.unwrap();
        let receivers = store.publish("room-1", "evt-1").await.unwrap();
        assert_eq!(receivers, 1);

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, ChannelMessage::new("room-1", "evt-1"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("nobody", "evt-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let store = MemoryStore::new();
        let (listener1, mut rx1) = forwarding_listener();
        let (listener2, mut rx2) = forwarding_listener();

        let _sub1 = store.subscribe("room-1", listener1).await.unwrap();
        let _sub2 = store.subscribe("room-1", listener2).await.unwrap();

        assert_eq!(store.publish("room-1", "evt-1").await.unwrap(), 2);

        assert_eq!(rx1.recv().await.unwrap().payload, "evt-1");
        assert_eq!(rx2.recv().await.unwrap().payload, "evt-1");
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let store = MemoryStore::new();
        let (listener, mut rx) = forwarding_listener();

        let _subscription = store.subscribe("room-1", listener).await.unwrap();
        store.publish("room-2", "evt-1").await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(received.is_err(), "Should not receive message for other room");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let (listener, mut rx) = forwarding_listener();

        let subscription = store.subscribe("room-1", listener).await.unwrap();
        subscription.unsubscribe().await;

        assert_eq!(store.publish("room-1", "evt-1").await.unwrap(), 0);
        // The listener (and its sender) went away with the task
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let store = MemoryStore::new();
        let (listener, mut rx) = forwarding_listener();

        let subscription = store.subscribe("room-1", listener).await.unwrap();
        store.shutdown().await;

        assert!(rx.recv().await.is_none());
        // The listener drops before the task is reported finished
        tokio::time::timeout(Duration::from_secs(1), async {
            while subscription.is_active() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription task should finish after shutdown");
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_fails() {
        let store = MemoryStore::new();
        store.shutdown().await;

        let (listener, _rx) = forwarding_listener();
        let result = store.subscribe("room-1", listener).await;
        assert!(matches!(result, Err(StoreError::ShutDown)));
    }
}
