//! Bus transport abstraction (mechanics only).
//!
//! A broker adapter provides a `Connector` that opens independent publish and consume
//! channels. The bridge in `itemrelay-infra` owns reconnection; adapters only report
//! failures as `TransportError` and never retry on their own.
//!
//! ## Delivery model
//!
//! - **Direct exchange**: a message published with routing key `k` is copied to every
//!   queue bound to the exchange under `k`.
//! - **Auto-ack**: a message handed out by `ConsumeChannel::next_delivery` is consumed
//!   as far as the broker is concerned.
//! - **Idempotent declaration**: `BusChannel::declare` is called on every (re)connect and
//!   must be a no-op when exchange, queue and binding already exist.
//!
//! A channel that returned a `TransportError` is never used again; the caller drops it
//! and asks the connector for a fresh one.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The exchange/queue/routing-key triple both channel directions are bound to.
///
/// Fixed at startup; declared on every connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusBinding {
    exchange: String,
    queue: String,
    routing_key: String,
}

impl BusBinding {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Exchanges are always declared as `direct`.
    pub fn exchange_kind(&self) -> &'static str {
        "direct"
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }
}

impl core::fmt::Display for BusBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.exchange, self.routing_key, self.queue)
    }
}

/// Transport-level failure. Always recoverable by reconnecting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker could not be reached (connect refused, DNS, handshake).
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// An established connection dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The broker invalidated the channel (e.g. protocol error, missing exchange).
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Behaviour shared by both channel directions.
pub trait BusChannel: Send {
    /// Declare exchange, queue and binding. Idempotent.
    fn declare(&mut self, binding: &BusBinding) -> Result<(), TransportError>;
}

/// Publish direction of a bus connection.
pub trait PublishChannel: BusChannel {
    /// Hand `body` to the broker for routing via `binding`'s exchange and routing key.
    ///
    /// `Ok` means the transport accepted the bytes; it says nothing about durable
    /// storage on the broker.
    fn publish(&mut self, binding: &BusBinding, body: &[u8]) -> Result<(), TransportError>;
}

/// Consume direction of a bus connection.
pub trait ConsumeChannel: BusChannel {
    /// Wait up to `timeout` for the next message on `binding`'s queue.
    ///
    /// `Ok(None)` means the wait timed out with nothing delivered.
    fn next_delivery(
        &mut self,
        binding: &BusBinding,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    /// Messages the broker already counts as delivered but `next_delivery` has not
    /// handed out yet. Called once before the channel is dropped on shutdown.
    fn take_buffered(&mut self) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

/// Opens fresh channels to the broker.
///
/// Every call returns a brand-new channel with its own underlying connection, so a
/// failure in one direction never affects the other.
pub trait Connector: Send + Sync + 'static {
    type Publish: PublishChannel;
    type Consume: ConsumeChannel;

    fn connect_publish(&self) -> Result<Self::Publish, TransportError>;

    fn connect_consume(&self) -> Result<Self::Consume, TransportError>;
}

impl<C> Connector for Arc<C>
where
    C: Connector,
{
    type Publish = C::Publish;
    type Consume = C::Consume;

    fn connect_publish(&self) -> Result<Self::Publish, TransportError> {
        (**self).connect_publish()
    }

    fn connect_consume(&self) -> Result<Self::Consume, TransportError> {
        (**self).connect_consume()
    }
}
