use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A raw message received on a pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

impl ChannelMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Callback invoked for every message delivered to a subscription.
pub type MessageListener = Arc<dyn Fn(ChannelMessage) + Send + Sync>;

/// Handle to an active channel subscription.
///
/// The subscription runs on a background task that owns a dedicated
/// connection. Dropping the handle (or calling [`Subscription::unsubscribe`])
/// stops that task and releases the connection.
pub struct Subscription {
    id: Uuid,
    channel: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns true while the background task is still delivering messages.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops delivery and waits for the background task to finish.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // A cancelled task resolves to a JoinError, which is expected here.
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}
