//! Infrastructure layer: messaging bridge, gateway orchestration, persister sinks,
//! broker adapters and configuration.

pub mod bridge;
pub mod config;
pub mod consumer;
pub mod event_bus;
pub mod gateway;
pub mod persister;
pub mod publisher;
pub mod shutdown;

#[cfg(test)]
mod integration_tests;

pub use bridge::{BridgeError, BridgeManager, ChannelState, Direction, RetryPolicy};
pub use config::{BridgeConfig, BrokerKind, ConfigError};
pub use consumer::{ConsumerHandle, ConsumerLoop};
pub use gateway::{CrudGateway, GatewayError};
pub use persister::{
    EventSink, InMemoryEventSink, LogEventSink, PersistError, PersistedEvent, Persister,
    SinkError,
};
pub use publisher::{EventPublisher, PublishError, Publisher};
pub use shutdown::ShutdownSignal;
