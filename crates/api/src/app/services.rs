use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use itemrelay_core::InMemoryItemStore;
use itemrelay_events::{BusBinding, Connector, EnvelopeError, EventEnvelope, InMemoryBroker};
use itemrelay_infra::{
    BridgeConfig, BridgeManager, BrokerKind, ChannelState, ConsumerHandle, ConsumerLoop,
    CrudGateway, Direction, EventPublisher, Publisher, RetryPolicy,
};

#[cfg(feature = "redis")]
use itemrelay_infra::event_bus::RedisConnector;

/// Gateway as used by the HTTP handlers (publisher type erased).
pub type Gateway = CrudGateway<Arc<InMemoryItemStore>, Arc<dyn EventPublisher>>;

/// Queue the API audit consumer reads from. Bound under the same exchange and
/// routing key as the persister's queue, so both receive every event.
pub fn audit_binding(binding: &BusBinding) -> BusBinding {
    BusBinding::new(
        binding.exchange(),
        format!("{}.audit", binding.queue()),
        binding.routing_key(),
    )
}

/// Publish bridge plus a separate bridge for the audit queue.
#[derive(Debug)]
pub struct Bridges<C: Connector> {
    publish: Arc<BridgeManager<C>>,
    audit: Arc<BridgeManager<C>>,
    publisher: Arc<Publisher<C>>,
}

impl<C: Connector> Clone for Bridges<C> {
    fn clone(&self) -> Self {
        Self {
            publish: self.publish.clone(),
            audit: self.audit.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

impl<C> Bridges<C>
where
    C: Connector + Clone,
{
    fn new(connector: C, binding: BusBinding, retry: RetryPolicy) -> Self {
        let audit = Arc::new(BridgeManager::new(
            connector.clone(),
            audit_binding(&binding),
            retry,
        ));
        let publish = Arc::new(BridgeManager::new(connector, binding, retry));
        let publisher = Arc::new(Publisher::new(publish.clone()));
        Self {
            publish,
            audit,
            publisher,
        }
    }

    fn state(&self, direction: Direction) -> ChannelState {
        match direction {
            Direction::Publish => self.publish.state(direction),
            Direction::Consume => self.audit.state(direction),
        }
    }

    fn request_shutdown(&self) {
        self.publish.shutdown();
        self.audit.shutdown();
    }

    fn warm_up(&self) {
        if let Err(err) = self.publisher.connect() {
            warn!(error = %err, "publish channel not opened");
        }
    }

    fn spawn_audit_consumer(&self) -> std::io::Result<ConsumerHandle> {
        ConsumerLoop::new(self.audit.clone()).spawn("api-audit-consumer", audit)
    }
}

/// The bridge for whichever broker was configured.
#[derive(Debug, Clone)]
pub enum BridgeBackend {
    InMemory(Bridges<InMemoryBroker>),
    #[cfg(feature = "redis")]
    Redis(Bridges<RedisConnector>),
}

impl BridgeBackend {
    fn in_memory(broker: InMemoryBroker, binding: BusBinding, retry: RetryPolicy) -> Self {
        BridgeBackend::InMemory(Bridges::new(broker, binding, retry))
    }

    #[cfg(feature = "redis")]
    fn redis(config: &BridgeConfig) -> anyhow::Result<Self> {
        let connector = RedisConnector::new(&config.broker_url)?;
        Ok(BridgeBackend::Redis(Bridges::new(
            connector,
            config.binding.clone(),
            config.retry_policy(),
        )))
    }

    fn publisher(&self) -> Arc<dyn EventPublisher> {
        match self {
            BridgeBackend::InMemory(b) => b.publisher.clone() as Arc<dyn EventPublisher>,
            #[cfg(feature = "redis")]
            BridgeBackend::Redis(b) => b.publisher.clone() as Arc<dyn EventPublisher>,
        }
    }

    /// Publish state comes from the publish bridge, consume state from the audit queue.
    pub fn state(&self, direction: Direction) -> ChannelState {
        match self {
            BridgeBackend::InMemory(b) => b.state(direction),
            #[cfg(feature = "redis")]
            BridgeBackend::Redis(b) => b.state(direction),
        }
    }

    fn request_shutdown(&self) {
        match self {
            BridgeBackend::InMemory(b) => b.request_shutdown(),
            #[cfg(feature = "redis")]
            BridgeBackend::Redis(b) => b.request_shutdown(),
        }
    }

    fn close_publisher(&self) {
        match self {
            BridgeBackend::InMemory(b) => b.publisher.close(),
            #[cfg(feature = "redis")]
            BridgeBackend::Redis(b) => b.publisher.close(),
        }
    }

    /// Open the publish channel in the background so the first request does not pay
    /// for the connect and health reports a real state.
    fn warm_up_publisher(&self) -> std::io::Result<()> {
        let backend = self.clone();
        thread::Builder::new()
            .name("publish-warmup".to_string())
            .spawn(move || match &backend {
                BridgeBackend::InMemory(b) => b.warm_up(),
                #[cfg(feature = "redis")]
                BridgeBackend::Redis(b) => b.warm_up(),
            })?;
        Ok(())
    }

    fn spawn_audit_consumer(&self) -> std::io::Result<ConsumerHandle> {
        match self {
            BridgeBackend::InMemory(b) => b.spawn_audit_consumer(),
            #[cfg(feature = "redis")]
            BridgeBackend::Redis(b) => b.spawn_audit_consumer(),
        }
    }
}

/// Logs every envelope seen on the audit queue.
fn audit(raw: &[u8]) -> Result<(), EnvelopeError> {
    let envelope = EventEnvelope::decode(raw)?;
    info!(
        event = %envelope.kind(),
        item_id = %envelope.item_id(),
        "event received"
    );
    Ok(())
}

/// Everything the HTTP handlers need, plus the background pieces to stop on exit.
pub struct AppServices {
    gateway: Gateway,
    backend: BridgeBackend,
    audit_consumer: Mutex<Option<ConsumerHandle>>,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    pub fn from_config(config: &BridgeConfig, api_consumer: bool) -> anyhow::Result<Self> {
        let backend = match config.broker {
            BrokerKind::Memory => {
                warn!("using the in-process broker; events never leave this process");
                BridgeBackend::in_memory(
                    InMemoryBroker::new(),
                    config.binding.clone(),
                    config.retry_policy(),
                )
            }
            #[cfg(feature = "redis")]
            BrokerKind::Redis => BridgeBackend::redis(config)?,
            #[cfg(not(feature = "redis"))]
            BrokerKind::Redis => anyhow::bail!("redis broker requested but not compiled in"),
        };
        Ok(Self::with_backend(backend, api_consumer)?)
    }

    /// Services over an in-memory broker (tests/dev). The caller keeps a clone of
    /// `broker` for fault injection.
    pub fn in_memory(
        broker: InMemoryBroker,
        binding: BusBinding,
        retry: RetryPolicy,
        api_consumer: bool,
    ) -> std::io::Result<Self> {
        Self::with_backend(BridgeBackend::in_memory(broker, binding, retry), api_consumer)
    }

    fn with_backend(backend: BridgeBackend, api_consumer: bool) -> std::io::Result<Self> {
        let gateway = CrudGateway::new(Arc::new(InMemoryItemStore::new()), backend.publisher());

        backend.warm_up_publisher()?;
        let audit_consumer = if api_consumer {
            Some(backend.spawn_audit_consumer()?)
        } else {
            info!("api audit consumer disabled");
            None
        };

        Ok(Self {
            gateway,
            backend,
            audit_consumer: Mutex::new(audit_consumer),
        })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn backend(&self) -> &BridgeBackend {
        &self.backend
    }

    pub fn bridge_state(&self, direction: Direction) -> ChannelState {
        self.backend.state(direction)
    }

    /// Stop every retry loop without waiting. Pending publishes return and their
    /// events are dropped.
    pub fn request_shutdown(&self) {
        self.backend.request_shutdown();
    }

    /// Stop the bridge, join the audit consumer and close the publish channel.
    /// Blocks; call from a blocking context.
    pub fn shutdown(&self) {
        self.backend.request_shutdown();

        let consumer = self
            .audit_consumer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = consumer {
            handle.shutdown();
        }

        self.backend.close_publisher();
        info!("bridge closed");
    }
}
