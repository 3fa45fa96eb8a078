use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{HealthStatus, MessageListener, Result, Subscription};

/// Trait for set membership operations.
#[async_trait]
pub trait SetStore: Send + Sync {
    /// Adds `item` to `set`, returning how many items were actually added.
    async fn add_member(&self, set: &str, item: &str) -> Result<u64>;

    /// Returns true if `item` is a member of `set`.
    async fn is_member(&self, set: &str, item: &str) -> Result<bool>;

    /// Returns every member of `set`, in no particular order.
    async fn members(&self, set: &str) -> Result<Vec<String>>;

    /// Removes `item` from `set`, returning how many items were removed.
    async fn remove_member(&self, set: &str, item: &str) -> Result<u64>;
}

/// Trait for head-appended, expiring event logs.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Prepends `entry` to `log` and resets its expiry to `ttl` in one
    /// atomic step. Returns the new length of the log.
    async fn push_with_ttl(&self, log: &str, entry: &str, ttl: Duration) -> Result<u64>;

    /// Returns the entry at `index`; negative indices count from the tail.
    async fn index(&self, log: &str, index: isize) -> Result<Option<String>>;

    /// Returns every entry of `log`, head first.
    async fn range_all(&self, log: &str) -> Result<Vec<String>>;
}

/// Trait for channel publish/subscribe.
#[async_trait]
pub trait ChannelPubSub: Send + Sync {
    /// Publishes `message` on `channel`, returning the number of receivers.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64>;

    /// Subscribes to `channel`. The subscription is active when this returns.
    async fn subscribe(&self, channel: &str, listener: MessageListener) -> Result<Subscription>;
}

/// A complete backend for the store façade.
#[async_trait]
pub trait StoreBackend: SetStore + EventLog + ChannelPubSub {
    /// Returns a receiver tracking the backend's connection health.
    fn health(&self) -> watch::Receiver<HealthStatus>;

    /// Stops background tasks and live subscriptions. Idempotent.
    async fn shutdown(&self);
}
