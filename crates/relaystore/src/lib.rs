//! relaystore - a small façade over Redis sets, expiring event logs and
//! pub/sub channels.
//!
//! ```no_run
//! use relaystore::{StoreConfig, StoreFacade};
//!
//! # async fn run() -> relaystore::Result<()> {
//! let config = StoreConfig::from_env();
//! let store = StoreFacade::connect(&config).await?;
//!
//! store.add_item("room:42:members", "alice").await?;
//! store.save_log("room:42", &serde_json::json!({ "joined": "alice" })).await?;
//! store.publish("room:42", "evt-1").await?;
//!
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod facade;
pub mod store;

pub use config::StoreConfig;
pub use facade::StoreFacade;
pub use relaystore_core::store::{
    ChannelMessage, HealthStatus, Result, StoreError, Subscription,
};
