//! `itemrelay-events` — event envelope and bus transport mechanics.
//!
//! - `envelope`: the wire value carried over the bus and its JSON codec
//! - `transport`: connector/channel traits a broker adapter implements
//! - `in_memory_broker`: a direct-exchange broker for tests/dev with fault injection

pub mod envelope;
pub mod in_memory_broker;
pub mod transport;

pub use envelope::{EnvelopeError, EventEnvelope, EventKind};
pub use in_memory_broker::{InMemoryBroker, InMemoryChannel};
pub use transport::{
    BusBinding, BusChannel, ConsumeChannel, Connector, PublishChannel, TransportError,
};
