//! Store backend implementations.
//!
//! This module provides concrete implementations of the backend traits
//! defined in `relaystore_core::store`.
//!
//! # Feature Flags
//!
//! - `redis` (default): Redis backend using the redis crate
//!
//! The in-memory backend is always compiled; it backs the test suite and
//! single-process use.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis_impl::RedisStore;
