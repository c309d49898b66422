//! Publisher: hands encoded envelopes to the bus, reconnecting on transport failure.
//!
//! ## Delivery contract
//!
//! `publish` returns `Ok` only after a live publish channel accepted the bytes. On a
//! transport failure the channel is dropped, the bridge reconnects, and the same bytes
//! are sent again, in a loop, until they go through. A message can therefore reach the
//! broker twice (the failed attempt may have landed) but is never silently dropped:
//! **at-least-once**.
//!
//! Publishes are serialized through the publisher's channel lock, so one caller's
//! sequential publishes are attempted in call order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};

use itemrelay_events::{Connector, EnvelopeError, EventEnvelope, PublishChannel};

use crate::bridge::{BridgeError, BridgeManager, Direction};

#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be encoded; retrying cannot help.
    #[error(transparent)]
    Serialization(#[from] EnvelopeError),

    /// Shutdown was requested before the message reached a live channel.
    #[error("bridge shut down before the message was delivered")]
    ShutDown,
}

impl From<BridgeError> for PublishError {
    fn from(value: BridgeError) -> Self {
        match value {
            BridgeError::ShutDown => PublishError::ShutDown,
        }
    }
}

/// Sink for encoded event envelopes (the gateway's view of the publisher).
pub trait EventPublisher: Send + Sync {
    /// Deliver already-encoded envelope bytes.
    fn publish_encoded(&self, body: &[u8]) -> Result<(), PublishError>;

    /// Encode and deliver an envelope.
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let body = envelope.encode()?;
        self.publish_encoded(&body)
    }
}

impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    fn publish_encoded(&self, body: &[u8]) -> Result<(), PublishError> {
        (**self).publish_encoded(body)
    }
}

/// Bus publisher owning the bridge's publish channel.
pub struct Publisher<C>
where
    C: Connector,
{
    bridge: Arc<BridgeManager<C>>,
    channel: Mutex<Option<C::Publish>>,
    published: AtomicU64,
    transport_failures: AtomicU64,
}

impl<C> Publisher<C>
where
    C: Connector,
{
    /// Create a publisher. The first channel is opened lazily on the first publish.
    pub fn new(bridge: Arc<BridgeManager<C>>) -> Self {
        Self {
            bridge,
            channel: Mutex::new(None),
            published: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
        }
    }

    /// Open the publish channel now instead of on first use.
    pub fn connect(&self) -> Result<(), PublishError> {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(self.bridge.ensure_publish_channel()?);
        }
        Ok(())
    }

    /// Drop the publish channel (graceful shutdown).
    pub fn close(&self) {
        if self.lock().take().is_some() {
            debug!("publish channel closed");
        }
        self.bridge.mark_disconnected(Direction::Publish);
    }

    pub fn bridge(&self) -> &Arc<BridgeManager<C>> {
        &self.bridge
    }

    /// Messages accepted by a live channel.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publish attempts that failed at the transport and were retried.
    pub fn transport_failure_count(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<C::Publish>> {
        self.channel.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<C> core::fmt::Debug for Publisher<C>
where
    C: Connector,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publisher")
            .field("binding", self.bridge.binding())
            .field("published", &self.published_count())
            .field("transport_failures", &self.transport_failure_count())
            .finish()
    }
}

impl<C> EventPublisher for Publisher<C>
where
    C: Connector,
{
    fn publish_encoded(&self, body: &[u8]) -> Result<(), PublishError> {
        let mut slot = self.lock();

        loop {
            let mut channel = match slot.take() {
                Some(channel) => channel,
                None => self.bridge.ensure_publish_channel()?,
            };

            match channel.publish(self.bridge.binding(), body) {
                Ok(()) => {
                    *slot = Some(channel);
                    self.published.fetch_add(1, Ordering::Relaxed);
                    debug!(bytes = body.len(), "message published");
                    return Ok(());
                }
                Err(err) => {
                    // The failed handle is stale; drop it and reconnect before retrying.
                    drop(channel);
                    self.transport_failures.fetch_add(1, Ordering::Relaxed);
                    self.bridge.mark_disconnected(Direction::Publish);
                    warn!(error = %err, "publish failed; reconnecting and retrying");
                }
            }
        }
    }
}
