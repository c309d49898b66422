use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use itemrelay_events::{ConsumeChannel, Connector};

use crate::bridge::{BridgeManager, Direction};
use crate::shutdown::ShutdownSignal;

/// How long one consume poll may block before the shutdown flag is re-checked.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to control and join a spawned consumer loop.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: ShutdownSignal,
    delivered: Arc<AtomicU64>,
    join: Option<thread::JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Request bridge shutdown and wait for the loop to close its channel and exit.
    pub fn shutdown(mut self) {
        self.shutdown.trigger();
        self.wait();
    }

    /// Messages handed to the handler so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    fn wait(&mut self) {
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                error!("consumer thread panicked");
            }
        }
    }
}

/// Long-running consume loop.
///
/// - Owns the bridge's consume channel for its whole lifetime
/// - Auto-ack: every delivered message counts as consumed, whatever the handler does
/// - Handler errors and panics are logged; the loop moves on to the next message
/// - Transport failures drop the channel and reconnect via the bridge
/// - Exits only when the bridge is shut down
#[derive(Debug)]
pub struct ConsumerLoop<C> {
    bridge: Arc<BridgeManager<C>>,
    poll_interval: Duration,
    delivered: Arc<AtomicU64>,
}

impl<C> ConsumerLoop<C>
where
    C: Connector,
{
    pub fn new(bridge: Arc<BridgeManager<C>>) -> Self {
        Self {
            bridge,
            poll_interval: DEFAULT_POLL_INTERVAL,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn the loop on a dedicated named thread.
    pub fn spawn<H, E>(self, name: &'static str, handler: H) -> std::io::Result<ConsumerHandle>
    where
        C: Connector,
        H: FnMut(&[u8]) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug,
    {
        let shutdown = self.bridge.shutdown_signal().clone();
        let delivered = self.delivered.clone();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.consume(name, handler))?;

        Ok(ConsumerHandle {
            shutdown,
            delivered,
            join: Some(join),
        })
    }

    /// Run the loop on the calling thread until bridge shutdown.
    pub fn consume<H, E>(&self, name: &str, mut handler: H)
    where
        H: FnMut(&[u8]) -> Result<(), E>,
        E: core::fmt::Debug,
    {
        let binding = self.bridge.binding().clone();

        'connect: loop {
            let mut channel = match self.bridge.ensure_consume_channel() {
                Ok(channel) => channel,
                Err(_) => break 'connect,
            };
            info!(consumer = name, queue = binding.queue(), "waiting for messages");

            loop {
                if self.bridge.is_shutting_down() {
                    self.drain_buffered(name, &mut channel, &mut handler);
                    break 'connect;
                }

                match channel.next_delivery(&binding, self.poll_interval) {
                    Ok(Some(body)) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                        dispatch(name, &mut handler, &body);
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(consumer = name, error = %err, "consume channel failed; reconnecting");
                        self.bridge.mark_disconnected(Direction::Consume);
                        continue 'connect;
                    }
                }
            }
        }

        self.bridge.mark_disconnected(Direction::Consume);
        info!(consumer = name, "consumer stopped");
    }

    /// Hand batch-read messages to the handler; the broker will not redeliver them.
    fn drain_buffered<H, E>(&self, name: &str, channel: &mut C::Consume, handler: &mut H)
    where
        H: FnMut(&[u8]) -> Result<(), E>,
        E: core::fmt::Debug,
    {
        let pending = channel.take_buffered();
        if pending.is_empty() {
            return;
        }
        info!(consumer = name, count = pending.len(), "draining buffered messages");
        for body in pending {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            dispatch(name, handler, &body);
        }
    }
}

fn dispatch<H, E>(name: &str, handler: &mut H, body: &[u8])
where
    H: FnMut(&[u8]) -> Result<(), E>,
    E: core::fmt::Debug,
{
    match panic::catch_unwind(AssertUnwindSafe(|| handler(body))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(consumer = name, error = ?err, "message handler failed"),
        Err(_) => error!(consumer = name, bytes = body.len(), "message handler panicked"),
    }
}
