//! In-memory direct-exchange broker for tests/dev.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::transport::{
    BusBinding, BusChannel, ConsumeChannel, Connector, PublishChannel, TransportError,
};

/// In-process broker with exchange/queue/binding semantics.
///
/// - No IO; cloning shares the same broker
/// - Queues are FIFO; consumers on one queue compete for messages
/// - Fault injection: `set_available(false)` refuses connects and breaks live channels,
///   `sever_connections()` breaks live channels but keeps accepting connects
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct BrokerState {
    down: bool,
    /// Bumped whenever live connections are dropped; channels remember the value they
    /// were opened under.
    generation: u64,
    /// exchange -> routing key -> bound queues
    exchanges: HashMap<String, HashMap<String, HashSet<String>>>,
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    connects: u64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the broker up or down. Going down drops every live channel.
    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        if !available && !state.down {
            state.generation += 1;
        }
        state.down = !available;
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Drop every live channel while staying reachable for new connects.
    pub fn sever_connections(&self) {
        self.lock().generation += 1;
        self.shared.changed.notify_all();
    }

    /// Total connect attempts seen, successful or not.
    pub fn connect_count(&self) -> u64 {
        self.lock().connects
    }

    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Remove and return every message waiting on `queue`.
    pub fn drain_queue(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .queues
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Whether exchange, queue and binding of `binding` are all declared.
    pub fn is_declared(&self, binding: &BusBinding) -> bool {
        let state = self.lock();
        let bound = state
            .exchanges
            .get(binding.exchange())
            .and_then(|keys| keys.get(binding.routing_key()))
            .is_some_and(|queues| queues.contains(binding.queue()));
        bound && state.queues.contains_key(binding.queue())
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.shared.lock()
    }

    fn open(&self) -> Result<InMemoryChannel, TransportError> {
        let mut state = self.lock();
        state.connects += 1;
        if state.down {
            return Err(TransportError::Unreachable("in-memory broker is down".into()));
        }
        Ok(InMemoryChannel {
            shared: self.shared.clone(),
            generation: state.generation,
        })
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One channel (either direction) on an `InMemoryBroker`.
#[derive(Debug)]
pub struct InMemoryChannel {
    shared: Arc<Shared>,
    generation: u64,
}

impl InMemoryChannel {
    fn check(&self, state: &BrokerState) -> Result<(), TransportError> {
        if state.down {
            return Err(TransportError::ConnectionLost("in-memory broker went down".into()));
        }
        if state.generation != self.generation {
            return Err(TransportError::ChannelClosed("connection was severed".into()));
        }
        Ok(())
    }
}

impl BusChannel for InMemoryChannel {
    fn declare(&mut self, binding: &BusBinding) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        self.check(&state)?;

        state
            .exchanges
            .entry(binding.exchange().to_string())
            .or_default()
            .entry(binding.routing_key().to_string())
            .or_default()
            .insert(binding.queue().to_string());
        state.queues.entry(binding.queue().to_string()).or_default();
        Ok(())
    }
}

impl PublishChannel for InMemoryChannel {
    fn publish(&mut self, binding: &BusBinding, body: &[u8]) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        self.check(&state)?;

        let targets: Vec<String> = match state.exchanges.get(binding.exchange()) {
            Some(keys) => keys
                .get(binding.routing_key())
                .map(|queues| queues.iter().cloned().collect())
                .unwrap_or_default(),
            None => {
                return Err(TransportError::ChannelClosed(format!(
                    "no exchange '{}'",
                    binding.exchange()
                )));
            }
        };

        // Unroutable messages are dropped, as a direct exchange would.
        for queue in targets {
            state
                .queues
                .entry(queue)
                .or_default()
                .push_back(body.to_vec());
        }
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl ConsumeChannel for InMemoryChannel {
    fn next_delivery(
        &mut self,
        binding: &BusBinding,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();

        loop {
            self.check(&state)?;

            let queue = state.queues.get_mut(binding.queue()).ok_or_else(|| {
                TransportError::ChannelClosed(format!("no queue '{}'", binding.queue()))
            })?;
            if let Some(body) = queue.pop_front() {
                return Ok(Some(body));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            state = match self.shared.changed.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Connector for InMemoryBroker {
    type Publish = InMemoryChannel;
    type Consume = InMemoryChannel;

    fn connect_publish(&self) -> Result<Self::Publish, TransportError> {
        self.open()
    }

    fn connect_consume(&self) -> Result<Self::Consume, TransportError> {
        self.open()
    }
}
