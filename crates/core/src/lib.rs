//! Core types for relaystore.
//!
//! Backend traits, the error taxonomy and pure helpers shared by every
//! store implementation. Nothing in this crate talks to the network.

pub mod store;
