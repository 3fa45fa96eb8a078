mod error;
mod functions;
mod health;
mod traits;
mod types;

pub use error::{Result, StoreError};
pub use functions::{membership_list, resolve_index, tail_index};
pub use health::{BackoffPolicy, HealthStatus};
pub use traits::{ChannelPubSub, EventLog, SetStore, StoreBackend};
pub use types::{ChannelMessage, MessageListener, Subscription};
