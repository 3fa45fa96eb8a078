//! Redis store backend implementation.
//!
//! Sets, expiring event logs and pub/sub over one shared connection
//! manager, with a supervised health check reporting connection state.

mod error;
mod health;
mod pubsub;
mod store;

pub use error::map_redis_error;
pub use store::RedisStore;
