//! Broker adapters implementing the `itemrelay-events` transport traits.
//!
//! The in-memory broker lives in `itemrelay-events`; this module provides the
//! network-backed ones.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisChannel, RedisConnector};
