//! The store façade.
//!
//! [`StoreFacade`] turns simple method calls into backend commands. It owns
//! JSON (de)serialization of log events, so backends only ever see strings,
//! and it applies the configured log lifetime on every append.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;

use relaystore_core::store::{
    membership_list, tail_index, ChannelMessage, HealthStatus, MessageListener, Result,
    StoreBackend, StoreError, Subscription,
};

use crate::config::StoreConfig;
use crate::store::MemoryStore;

/// Façade over a store backend.
///
/// Cloning is cheap; clones share the same backend and connection.
#[derive(Clone)]
pub struct StoreFacade {
    backend: Arc<dyn StoreBackend>,
    log_ttl: Duration,
}

impl StoreFacade {
    /// Wraps an existing backend.
    pub fn new(backend: Arc<dyn StoreBackend>, config: &StoreConfig) -> Self {
        Self {
            backend,
            log_ttl: config.log_max_lifetime(),
        }
    }

    /// Creates a façade over Redis using `config`.
    ///
    /// The connection is established lazily; watch [`StoreFacade::status`]
    /// to learn when it comes up.
    #[cfg(feature = "redis")]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let backend = crate::store::RedisStore::connect(config).await?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Creates a façade over a fresh in-memory store.
    pub fn in_memory(config: &StoreConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Overrides the lifetime applied to logs on every append.
    pub fn with_log_ttl(mut self, ttl: Duration) -> Self {
        self.log_ttl = ttl;
        self
    }

    pub fn log_ttl(&self) -> Duration {
        self.log_ttl
    }

    /// Sends `event_id` on `channel`.
    ///
    /// Delivery is not confirmed to the caller: the number of receivers is
    /// only logged.
    pub async fn publish(&self, channel: &str, event_id: &str) -> Result<()> {
        let receivers = self.backend.publish(channel, event_id).await?;
        tracing::debug!(
            receivers,
            "Published to channel [{}], eventId [{}]",
            channel,
            event_id
        );
        Ok(())
    }

    /// Adds `item` to `set`. Returns 1 if it was added, 0 if already present.
    pub async fn add_item(&self, set: &str, item: &str) -> Result<u64> {
        self.backend.add_member(set, item).await
    }

    /// Checks whether `item` belongs to `set`.
    ///
    /// Returns `[item]` when it does and an empty list otherwise. Use
    /// [`StoreFacade::members`] for the whole set.
    pub async fn check_item(&self, set: &str, item: &str) -> Result<Vec<String>> {
        let is_member = self.backend.is_member(set, item).await?;
        Ok(membership_list(item, is_member))
    }

    /// Returns every member of `set`.
    pub async fn members(&self, set: &str) -> Result<Vec<String>> {
        self.backend.members(set).await
    }

    /// Removes `item` from `set`. Returns 1 if it was removed, 0 otherwise.
    pub async fn remove_item(&self, set: &str, item: &str) -> Result<u64> {
        self.backend.remove_member(set, item).await
    }

    /// Serializes `event`, prepends it to the log `channel_id` and resets
    /// the log's expiry. Returns the new log length.
    pub async fn save_log<T: Serialize + ?Sized>(
        &self,
        channel_id: &str,
        event: &T,
    ) -> Result<u64> {
        let entry =
            serde_json::to_string(event).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let len = self
            .backend
            .push_with_ttl(channel_id, &entry, self.log_ttl)
            .await?;
        tracing::debug!(log = channel_id, len, "Saved log entry");
        Ok(len)
    }

    /// Subscribes `listener` to every message published on `room`.
    ///
    /// The subscription is live once this returns. Keep the returned handle
    /// alive for as long as messages should be delivered.
    pub async fn subscribe<F>(&self, room: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        let listener: MessageListener = Arc::new(listener);
        self.backend.subscribe(room, listener).await
    }

    /// Reads the `event_id`-th oldest entry of the log `channel_id`.
    ///
    /// Entries are counted from the tail, so `event_id = 1` is the first
    /// entry ever appended that has not expired.
    pub async fn get_log<T: DeserializeOwned>(&self, channel_id: &str, event_id: i64) -> Result<T> {
        let index = tail_index(event_id);
        let entry = self
            .backend
            .index(channel_id, index)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                log: channel_id.to_string(),
                index,
            })?;
        parse_entry(&entry)
    }

    /// Reads the whole log, most recent entry first.
    pub async fn get_all_logs<T: DeserializeOwned>(&self, log: &str) -> Result<Vec<T>> {
        self.backend
            .range_all(log)
            .await?
            .iter()
            .map(|entry| parse_entry(entry))
            .collect()
    }

    /// Current connection health.
    pub fn status(&self) -> HealthStatus {
        self.backend.health().borrow().clone()
    }

    /// Receiver notified on every health transition.
    pub fn watch_status(&self) -> watch::Receiver<HealthStatus> {
        self.backend.health()
    }

    /// Stops background work and live subscriptions. Later calls fail with
    /// `StoreError::ShutDown`.
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

fn parse_entry<T: DeserializeOwned>(entry: &str) -> Result<T> {
    serde_json::from_str(entry).map_err(|e| StoreError::Serialization(e.to_string()))
}
