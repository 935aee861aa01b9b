use anyhow::{Context, Result};
use rincon_client::{HeartbeatEvent, RegistryClient};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting rincon-agent...");

    let config = AgentConfig::load()?;
    let client = RegistryClient::connect(config.registry.clone())
        .await
        .with_context(|| format!("connecting to registry at {}", config.registry.base_url))?;
    info!("Registry protocol {}", client.protocol());

    let report = client
        .register(config.service.clone(), config.routes.clone())
        .await
        .context("registering service")?;
    info!(
        "Registered {} as {:?} ({} routes)",
        report.service.formatted_name_with_version(),
        report.id(),
        report.routes.len()
    );
    for outcome in report.failed_routes() {
        if let Err(e) = &outcome.result {
            warn!("Route {} {} was not registered: {}", outcome.route.method, outcome.route.route, e);
        }
    }

    let mut events = client.subscribe_heartbeat();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(HeartbeatEvent::Beat { id }) => debug!("Heartbeat accepted for {:?}", id),
                Ok(HeartbeatEvent::Failed {
                    error,
                    consecutive_failures,
                    retry_in,
                }) => {
                    if consecutive_failures >= 3 {
                        error!(
                            "Registry unreachable for {} heartbeats, next in {:?}: {}",
                            consecutive_failures, retry_in, error
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} heartbeat events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, deregistering...");

    if let Err(e) = client.deregister().await {
        error!("Deregistration failed: {}", e);
    }

    let stats = client.heartbeat_stats();
    info!(
        "Heartbeats: {} sent, {} failed",
        stats.ticks, stats.failures
    );
    debug!("Client metrics:\n{}", client.metrics().gather_text()?);

    Ok(())
}

/// Log to stdout, filtered by RUST_LOG; RINCON_LOG_FORMAT=json switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RINCON_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
