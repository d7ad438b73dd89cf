//! USE aggregation of per-core CPU utilization
//!
//! Turns a raw per-core percentage vector into a [`DerivedMetrics`] record:
//! - Utilization: mean of the per-core percentages
//! - Saturation: see [`SaturationPolicy`]
//! - Errors: a configured constant (CPU exposes no error counter)
//! - Latency: duration of one clock cycle in milliseconds
//! - Throughput: effective and theoretical aggregate MHz

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{DerivedMetrics, HostSpec, RawSample};

/// How saturation is derived from the per-core readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Saturation tracks the average utilization
    Direct,
    /// Busiest core relative to the point where contention begins.
    /// Values above 100 mean over-saturation.
    Referenced { reference_percent: f64 },
}

impl SaturationPolicy {
    fn saturation(&self, average: f64, max: f64) -> f64 {
        match self {
            SaturationPolicy::Direct => average,
            SaturationPolicy::Referenced { reference_percent } => 100.0 * max / reference_percent,
        }
    }
}

/// Destination for the per-tick gauges
pub trait MetricsSink: Send + Sync {
    /// Publish one core's utilization and its MHz equivalent
    fn publish_core(&self, core: usize, percent: f64, mhz: f64) -> anyhow::Result<()>;

    /// Publish the aggregate USE values
    fn publish_use(&self, metrics: &DerivedMetrics) -> anyhow::Result<()>;
}

/// Compute the USE summary for one sample.
///
/// `host` must have passed startup validation, so the frequency is positive
/// and the core count non-zero. An empty vector yields all-zero extrema.
pub fn aggregate(raw: &RawSample, host: &HostSpec, policy: SaturationPolicy) -> DerivedMetrics {
    aggregate_with_errors(raw, host, policy, 0.0)
}

fn aggregate_with_errors(
    raw: &RawSample,
    host: &HostSpec,
    policy: SaturationPolicy,
    errors: f64,
) -> DerivedMetrics {
    let mhz = host.rated_frequency_mhz;
    let per_core = raw.utilization_per_core.clone();

    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut throughput = 0.0;

    for &percent in &per_core {
        sum += percent;
        max = max.max(percent);
        min = min.min(percent);
        throughput += percent * mhz / 100.0;
    }

    let (average, max, min) = if per_core.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (sum / per_core.len() as f64, max, min)
    };

    DerivedMetrics {
        per_core,
        average,
        max,
        min,
        utilization: average,
        saturation: policy.saturation(average, max),
        errors,
        latency_ms_per_op: 1e3 / mhz,
        throughput_mhz_effective: throughput,
        throughput_max_mhz: mhz * host.num_cores as f64,
        degraded: raw.degraded,
    }
}

/// Static aggregation settings fixed at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorSettings {
    pub policy: SaturationPolicy,
    /// Value reported in the `errors` field
    pub errors_constant: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            policy: SaturationPolicy::Direct,
            errors_constant: 0.0,
        }
    }
}

/// Aggregator bound to a host description and settings
#[derive(Debug, Clone)]
pub struct Aggregator {
    host: HostSpec,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(host: HostSpec, settings: AggregatorSettings) -> Self {
        Self { host, settings }
    }

    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Pure aggregation with the configured policy and errors constant
    pub fn aggregate(&self, raw: &RawSample) -> DerivedMetrics {
        aggregate_with_errors(
            raw,
            &self.host,
            self.settings.policy,
            self.settings.errors_constant,
        )
    }

    /// Aggregate and push the gauges to `sink`. Sink failures are logged only.
    pub fn aggregate_and_publish(&self, raw: &RawSample, sink: &dyn MetricsSink) -> DerivedMetrics {
        let metrics = self.aggregate(raw);
        let mhz = self.host.rated_frequency_mhz;

        for (core, &percent) in metrics.per_core.iter().enumerate() {
            if let Err(e) = sink.publish_core(core, percent, percent * mhz / 100.0) {
                warn!(core = core, error = %e, "Failed to publish per-core gauges");
            }
        }

        if let Err(e) = sink.publish_use(&metrics) {
            warn!(error = %e, "Failed to publish USE gauges");
        }

        metrics
    }
}
