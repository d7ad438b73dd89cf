//! Tick loop
//!
//! Drives one sample, aggregate and evaluate cycle per tick at a fixed
//! interval. A tick starts only after the previous one has returned.

use super::Sampler;
use crate::aggregator::Aggregator;
use crate::alert::{evaluate, AlertEvent};
use crate::health::{components, HealthRegistry};
use crate::models::{CpuTimes, DerivedMetrics};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::thresholds::ThresholdConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the tick loop
#[derive(Debug, Clone)]
pub struct TickLoopConfig {
    /// Time between ticks (default: 1 second)
    pub interval: Duration,
    /// Number of ticks to run; `None` runs until shutdown
    pub iterations: Option<u64>,
    /// Channel buffer size for tick reports
    pub buffer_size: usize,
}

impl Default for TickLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            iterations: None,
            buffer_size: 64,
        }
    }
}

/// Everything produced by one tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub iteration: u64,
    /// Measurement time in fractional Unix seconds
    pub timestamp: f64,
    pub metrics: DerivedMetrics,
    pub alert: AlertEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_times: Option<Vec<CpuTimes>>,
}

/// Periodic sample/aggregate/evaluate driver
pub struct TickLoop {
    sampler: Sampler,
    aggregator: Aggregator,
    thresholds: Arc<ThresholdConfig>,
    config: TickLoopConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    reports_tx: mpsc::Sender<TickReport>,
}

impl TickLoop {
    pub fn new(
        sampler: Sampler,
        aggregator: Aggregator,
        thresholds: Arc<ThresholdConfig>,
        config: TickLoopConfig,
        metrics: AgentMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> (Self, mpsc::Receiver<TickReport>) {
        let (reports_tx, reports_rx) = mpsc::channel(config.buffer_size);

        let tick_loop = Self {
            sampler,
            aggregator,
            thresholds,
            config,
            metrics,
            logger,
            health,
            reports_tx,
        };

        (tick_loop, reports_rx)
    }

    pub fn config(&self) -> &TickLoopConfig {
        &self.config
    }

    /// Run until the configured iteration count is reached or shutdown fires
    pub async fn run(mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            iterations = ?self.config.iterations,
            "Starting tick loop"
        );

        // First measurement lands one interval after the warm-up read
        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(limit) = self.config.iterations {
                if self.sampler.ticks() >= limit {
                    info!(ticks = limit, "Tick loop finished");
                    break;
                }
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;

                    if let Err(e) = self.reports_tx.try_send(report) {
                        debug!(error = %e, "Tick report dropped");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down tick loop");
                    break;
                }
            }
        }
    }

    /// Run one full sample, aggregate and evaluate cycle
    pub async fn tick(&mut self) -> TickReport {
        let start = Instant::now();

        let sample = self.sampler.sample();
        let iteration = sample.tick;

        if let Some(reason) = &sample.error {
            self.metrics.inc_sample_errors();
            self.logger.log_sample_degraded(iteration, reason);
        }
        self.health.record_sample(sample.error.as_deref()).await;

        let metrics = self
            .aggregator
            .aggregate_and_publish(&sample.raw, &self.metrics);

        if let Some(times) = &sample.cpu_times {
            self.metrics.set_cpu_times(times);
        }

        let alert = evaluate(&metrics, &self.thresholds);
        self.metrics.record_alert(&alert);
        if alert.raised {
            self.logger.log_alert(iteration, &alert);
        }

        let elapsed = start.elapsed();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());
        if elapsed > self.config.interval {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Tick took longer than the tick interval"
            );
            self.health
                .set_degraded(components::EVALUATOR, "Tick overran interval")
                .await;
        } else {
            self.health.set_healthy(components::EVALUATOR).await;
        }

        let report = TickReport {
            iteration,
            timestamp: unix_timestamp(),
            metrics,
            alert,
            cpu_times: sample.cpu_times,
        };
        self.logger.log_tick(&report);

        report
    }
}

/// Current time in fractional Unix seconds
fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 / 1e9
}

/// Builder for creating the tick loop
pub struct TickLoopBuilder {
    sampler: Option<Sampler>,
    aggregator: Option<Aggregator>,
    thresholds: Option<Arc<ThresholdConfig>>,
    config: TickLoopConfig,
    metrics: Option<AgentMetrics>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl TickLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sampler: None,
            aggregator: None,
            thresholds: None,
            config: TickLoopConfig::default(),
            metrics: None,
            logger: None,
            health: None,
        }
    }

    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn thresholds(mut self, thresholds: Arc<ThresholdConfig>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Set the tick interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Stop after `count` ticks; zero means run until shutdown
    pub fn iterations(mut self, count: u64) -> Self {
        self.config.iterations = if count == 0 { None } else { Some(count) };
        self
    }

    /// Set the report channel buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the tick loop. The aggregator must match the sampler's host.
    pub fn build(self) -> Result<(TickLoop, mpsc::Receiver<TickReport>)> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let aggregator = self
            .aggregator
            .ok_or_else(|| anyhow::anyhow!("Aggregator is required"))?;
        let thresholds = self
            .thresholds
            .ok_or_else(|| anyhow::anyhow!("Thresholds are required"))?;

        if aggregator.host() != sampler.host() {
            anyhow::bail!("Aggregator host does not match sampler host");
        }

        let mut config = self.config;
        let floor = sampler.min_interval();
        if config.interval < floor {
            warn!(
                requested_ms = config.interval.as_millis() as u64,
                minimum_ms = floor.as_millis() as u64,
                "Tick interval below CPU source refresh minimum, raising it"
            );
            config.interval = floor;
        }

        Ok(TickLoop::new(
            sampler,
            aggregator,
            thresholds,
            config,
            self.metrics.unwrap_or_default(),
            self.logger
                .unwrap_or_else(|| StructuredLogger::new("unknown")),
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for TickLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
