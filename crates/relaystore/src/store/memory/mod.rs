//! In-memory store backend implementation.
//!
//! Provides thread-safe sets, expiring logs and pub/sub for tests and
//! single-process use.

mod pubsub;
mod store;

pub use store::MemoryStore;
