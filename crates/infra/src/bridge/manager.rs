use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use itemrelay_events::{BusBinding, BusChannel, Connector, TransportError};

use super::{ChannelState, Direction};
use crate::shutdown::ShutdownSignal;

/// Default delay between connect attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Reconnect pacing: a fixed delay between attempts, retried forever.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Shutdown was requested before a channel could be established.
    #[error("bridge is shutting down")]
    ShutDown,
}

#[derive(Debug, Default)]
struct DirectionSlot {
    state: Mutex<ChannelState>,
    connects: AtomicU64,
}

impl DirectionSlot {
    fn set(&self, state: ChannelState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn get(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Owns the connector, the binding and the per-direction connection state.
///
/// The manager hands out channels but does not keep them: the publisher owns the
/// publish handle and the consumer loop owns the consume handle. When an owner sees a
/// transport failure it drops its handle, calls `mark_disconnected` and asks for a
/// fresh one.
#[derive(Debug)]
pub struct BridgeManager<C> {
    connector: C,
    binding: BusBinding,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
    publish: DirectionSlot,
    consume: DirectionSlot,
}

impl<C> BridgeManager<C>
where
    C: Connector,
{
    pub fn new(connector: C, binding: BusBinding, retry: RetryPolicy) -> Self {
        Self {
            connector,
            binding,
            retry,
            shutdown: ShutdownSignal::new(),
            publish: DirectionSlot::default(),
            consume: DirectionSlot::default(),
        }
    }

    pub fn binding(&self) -> &BusBinding {
        &self.binding
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self, direction: Direction) -> ChannelState {
        self.slot(direction).get()
    }

    /// Number of successful connects for `direction` (first connect included).
    pub fn connect_count(&self, direction: Direction) -> u64 {
        self.slot(direction).connects.load(Ordering::Relaxed)
    }

    /// Block until a declared publish channel is available.
    ///
    /// Transport failures are retried forever with the configured delay; the only
    /// error is `ShutDown`.
    pub fn ensure_publish_channel(&self) -> Result<C::Publish, BridgeError> {
        self.ensure(Direction::Publish, || self.connector.connect_publish())
    }

    /// Block until a declared consume channel is available.
    pub fn ensure_consume_channel(&self) -> Result<C::Consume, BridgeError> {
        self.ensure(Direction::Consume, || self.connector.connect_consume())
    }

    /// Record that the owner of `direction`'s handle saw it fail and dropped it.
    pub fn mark_disconnected(&self, direction: Direction) {
        self.slot(direction).set(ChannelState::Disconnected);
    }

    /// Stop all retry loops. Channel owners observe this and close their handles.
    pub fn shutdown(&self) {
        info!(binding = %self.binding, "bridge shutdown requested");
        self.shutdown.trigger();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    fn slot(&self, direction: Direction) -> &DirectionSlot {
        match direction {
            Direction::Publish => &self.publish,
            Direction::Consume => &self.consume,
        }
    }

    #[instrument(skip(self, direction, connect), fields(direction = %direction, binding = %self.binding))]
    fn ensure<H, F>(&self, direction: Direction, connect: F) -> Result<H, BridgeError>
    where
        H: BusChannel,
        F: Fn() -> Result<H, TransportError>,
    {
        let slot = self.slot(direction);
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_triggered() {
                slot.set(ChannelState::Disconnected);
                return Err(BridgeError::ShutDown);
            }

            attempt += 1;
            slot.set(ChannelState::Connecting);

            // A handle that fails declaration is dropped here and never reused.
            let result = connect().and_then(|mut channel| {
                channel.declare(&self.binding)?;
                Ok(channel)
            });

            match result {
                Ok(channel) => {
                    slot.set(ChannelState::Connected);
                    slot.connects.fetch_add(1, Ordering::Relaxed);
                    info!(attempt, "bus channel connected");
                    return Ok(channel);
                }
                Err(err) => {
                    slot.set(ChannelState::Degraded);
                    warn!(
                        attempt,
                        error = %err,
                        retry_in = ?self.retry.delay(),
                        "failed to connect to bus; retrying"
                    );
                    if self.shutdown.wait_timeout(self.retry.delay()) {
                        slot.set(ChannelState::Disconnected);
                        return Err(BridgeError::ShutDown);
                    }
                }
            }
        }
    }
}
