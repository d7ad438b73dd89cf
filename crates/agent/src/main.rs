//! SRE Agent - host CPU USE monitor
//!
//! Samples per-core CPU utilization once per tick, publishes the USE
//! summary to Prometheus and raises threshold alerts.

use agent_lib::{
    alert::AlertmanagerPayload,
    collector::{HostCpuSource, Sampler, TickLoopBuilder, TickReport},
    health::HealthRegistry,
    observability::{AgentMetrics, StructuredLogger},
    Aggregator, AggregatorSettings,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sre-agent");

    let config = config::AgentConfig::load()?;
    info!(node_name = %config.node_name, "Agent configured");

    let thresholds = Arc::new(
        config
            .thresholds()
            .context("Failed to load alert thresholds")?,
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let sampler = Sampler::init(Box::new(HostCpuSource::new()), &thresholds.tuning)
        .context("Failed to initialize CPU sampler")?;
    logger.log_startup(AGENT_VERSION, sampler.host());

    let aggregator = Aggregator::new(
        *sampler.host(),
        AggregatorSettings {
            policy: thresholds.saturation_policy(),
            errors_constant: config.errors_constant,
        },
    );

    let (tick_loop, reports) = TickLoopBuilder::new()
        .sampler(sampler)
        .aggregator(aggregator)
        .thresholds(thresholds)
        .interval(config.tick_interval())
        .iterations(config.iterations)
        .metrics(metrics.clone())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    // Start health and metrics server
    let api_handle = tokio::spawn(api::run(config.api_port, app_state.clone()));
    let report_handle = tokio::spawn(consume_reports(
        reports,
        app_state,
        config.node_name.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut loop_handle = tokio::spawn(tick_loop.run(shutdown_rx));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            if let Err(e) = loop_handle.await {
                error!(error = %e, "Tick loop task failed");
            }
        }
        result = &mut loop_handle => {
            if let Err(e) = result {
                error!(error = %e, "Tick loop task failed");
            }
            logger.log_shutdown("iterations complete");
        }
    }

    // The loop owns the report sender; the consumer ends once it is dropped
    if let Err(e) = report_handle.await {
        error!(error = %e, "Report consumer failed");
    }
    api_handle.abort();

    info!("Shutting down");
    Ok(())
}

/// Publish each tick to the API and emit raised alerts in Alertmanager form
async fn consume_reports(
    mut reports: mpsc::Receiver<TickReport>,
    state: Arc<api::AppState>,
    node_name: String,
) {
    while let Some(report) = reports.recv().await {
        let timestamp = chrono::Utc::now().to_rfc3339();
        if let Some(alert) = report
            .alert
            .to_alertmanager(&node_name, &report.metrics, &timestamp)
        {
            match serde_json::to_string(&AlertmanagerPayload::new(vec![alert])) {
                Ok(payload) => debug!(payload = %payload, "Alertmanager payload"),
                Err(e) => error!(error = %e, "Failed to serialize alert payload"),
            }
        }

        state.publish(report).await;
    }
}
