use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use itemrelay_api::app::{self, services::AppServices};
use itemrelay_infra::{BridgeConfig, config};

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    itemrelay_observability::init();

    let bridge_config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    let api_consumer = config::flag(|k| std::env::var(k).ok(), "API_CONSUMER", true)?;
    let http_addr = std::env::var("HTTP_ADDR").unwrap_or_else(|_| {
        warn!(default = DEFAULT_HTTP_ADDR, "HTTP_ADDR not set; using default");
        DEFAULT_HTTP_ADDR.to_string()
    });

    let services = Arc::new(AppServices::from_config(&bridge_config, api_consumer)?);
    let router = app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    info!(addr = %listener.local_addr()?, binding = %bridge_config.binding, "listening");

    let signal_services = services.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for ctrl-c");
            }
            // Unblock requests stuck in publish retries before draining connections.
            signal_services.request_shutdown();
        })
        .await?;

    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    info!("api stopped");
    Ok(())
}
