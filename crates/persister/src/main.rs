//! Persister process: consumes the item event queue and records every envelope.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use itemrelay_events::Connector;
use itemrelay_infra::{
    BridgeConfig, BridgeManager, BrokerKind, ConsumerHandle, ConsumerLoop, EventSink,
    LogEventSink, Persister,
};

#[cfg(feature = "postgres")]
use itemrelay_infra::persister::postgres::PostgresEventSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    itemrelay_observability::init();

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    let persister = Persister::new(build_sink().await?);

    let consumer: ConsumerHandle = match config.broker {
        #[cfg(feature = "redis")]
        BrokerKind::Redis => {
            let connector = itemrelay_infra::event_bus::RedisConnector::new(&config.broker_url)?;
            start(connector, &config, persister)?
        }
        #[cfg(not(feature = "redis"))]
        BrokerKind::Redis => anyhow::bail!("redis broker requested but not compiled in"),
        BrokerKind::Memory => {
            anyhow::bail!("the persister needs a network broker; BROKER=memory only works in-process")
        }
    };
    info!(binding = %config.binding, "persister running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    tokio::task::spawn_blocking(move || consumer.shutdown()).await?;
    info!("persister stopped");
    Ok(())
}

fn start<C>(
    connector: C,
    config: &BridgeConfig,
    persister: Persister<Arc<dyn EventSink>>,
) -> std::io::Result<ConsumerHandle>
where
    C: Connector,
{
    let bridge = Arc::new(BridgeManager::new(
        connector,
        config.binding.clone(),
        config.retry_policy(),
    ));
    ConsumerLoop::new(bridge).spawn("persister", move |raw: &[u8]| persister.handle(raw))
}

async fn build_sink() -> anyhow::Result<Arc<dyn EventSink>> {
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());

    match database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let sink = PostgresEventSink::connect(&url)
                .await
                .context("failed to prepare postgres sink")?;
            Ok(Arc::new(sink))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!("DATABASE_URL set but postgres support is not compiled in; logging events only");
            Ok(Arc::new(LogEventSink))
        }
        None => {
            warn!("DATABASE_URL not set; logging events only");
            Ok(Arc::new(LogEventSink))
        }
    }
}
