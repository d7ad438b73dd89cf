//! Observability infrastructure for the SRE agent
//!
//! Provides:
//! - Prometheus gauges for the CPU USE summary and per-core readings
//! - Agent self-metrics (tick latency, sample errors, alerts raised)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::aggregator::MetricsSink;
use crate::alert::{AlertEvent, AlertLevel};
use crate::collector::TickReport;
use crate::models::{CpuTimes, DerivedMetrics, HostSpec};

/// Default histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cpu_indicator: GaugeVec,
    cpu_percent: GaugeVec,
    cpu_mhz: GaugeVec,
    cpu_times_seconds: GaugeVec,
    tick_latency_seconds: Histogram,
    sample_errors: IntCounter,
    alerts_raised: IntCounterVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cpu_indicator: register_gauge_vec!(
                "sreagent_cpu_metrics",
                "CPU Utilization Saturation Errors Throughput Latency",
                &["use"]
            )
            .expect("Failed to register cpu_metrics"),

            cpu_percent: register_gauge_vec!(
                "sreagent_cpu_percent",
                "Host CPU utilization per core in percent",
                &["cpu"]
            )
            .expect("Failed to register cpu_percent"),

            cpu_mhz: register_gauge_vec!(
                "sreagent_cpu_mhz",
                "Host CPU utilization per core in MHz",
                &["cpu"]
            )
            .expect("Failed to register cpu_mhz"),

            cpu_times_seconds: register_gauge_vec!(
                "sreagent_cpu_times_seconds",
                "Cumulative per-core CPU time by mode",
                &["cpu", "mode"]
            )
            .expect("Failed to register cpu_times_seconds"),

            tick_latency_seconds: register_histogram!(
                "sreagent_tick_latency_seconds",
                "Time spent sampling, aggregating and evaluating one tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            sample_errors: register_int_counter!(
                "sreagent_sample_errors_total",
                "Total number of failed CPU reads replaced by zero-filled samples"
            )
            .expect("Failed to register sample_errors"),

            alerts_raised: register_int_counter_vec!(
                "sreagent_alerts_total",
                "Total number of alert events raised by level",
                &["level"]
            )
            .expect("Failed to register alerts_raised"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record how long one tick took
    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn inc_sample_errors(&self) {
        self.inner().sample_errors.inc();
    }

    /// Count a raised alert. Clean events are not counted.
    pub fn record_alert(&self, event: &AlertEvent) {
        if event.raised {
            self.inner()
                .alerts_raised
                .with_label_values(&[event.level.as_str()])
                .inc();
        }
    }

    /// Export the secondary CPU-times read
    pub fn set_cpu_times(&self, times: &[CpuTimes]) {
        for core in times {
            for (mode, seconds) in core.modes() {
                self.inner()
                    .cpu_times_seconds
                    .with_label_values(&[core.cpu.as_str(), mode])
                    .set(seconds);
            }
        }
    }
}

impl MetricsSink for AgentMetrics {
    fn publish_core(&self, core: usize, percent: f64, mhz: f64) -> anyhow::Result<()> {
        let label = format!("cpu{}", core);
        self.inner()
            .cpu_percent
            .get_metric_with_label_values(&[label.as_str()])?
            .set(percent);
        self.inner()
            .cpu_mhz
            .get_metric_with_label_values(&[label.as_str()])?
            .set(mhz);
        Ok(())
    }

    fn publish_use(&self, metrics: &DerivedMetrics) -> anyhow::Result<()> {
        for (name, value) in [
            ("utilization", metrics.utilization),
            ("saturation", metrics.saturation),
            ("throughput", metrics.throughput_mhz_effective),
            ("throughputmax", metrics.throughput_max_mhz),
            ("latency", metrics.latency_ms_per_op),
            ("errors", metrics.errors),
        ] {
            self.inner()
                .cpu_indicator
                .get_metric_with_label_values(&[name])?
                .set(value);
        }
        Ok(())
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for ticks, alerts
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log agent startup with the host description
    pub fn log_startup(&self, version: &str, host: &HostSpec) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            num_cores = host.num_cores,
            rated_frequency_mhz = host.rated_frequency_mhz,
            "SRE agent started"
        );
    }

    /// Log one completed tick with its measure and alert tuple
    pub fn log_tick(&self, report: &TickReport) {
        let measure = report
            .metrics
            .to_json()
            .unwrap_or_else(|e| format!("<unserializable: {}>", e));
        let (message, level, raised, cause) = report.alert.as_tuple();

        info!(
            event = "tick_completed",
            node = %self.node_name,
            iteration = report.iteration,
            timestamp = report.timestamp,
            measure = %measure,
            degraded = report.metrics.degraded,
            cpu_times = report.cpu_times.is_some(),
            alert_msg = %message,
            alert_lvl = %level,
            is_alert = raised,
            alert_cause = %cause,
            "Tick"
        );
    }

    /// Log a raised alert at a level matching its severity
    pub fn log_alert(&self, iteration: u64, event: &AlertEvent) {
        match event.level {
            AlertLevel::Fatal => {
                error!(
                    event = "alert_raised",
                    node = %self.node_name,
                    iteration = iteration,
                    level = %event.level,
                    cause = %event.cause,
                    findings = event.findings.len(),
                    message = %event.message,
                    "CPU alert: engineered point exceeded"
                );
            }
            AlertLevel::Warn => {
                warn!(
                    event = "alert_raised",
                    node = %self.node_name,
                    iteration = iteration,
                    level = %event.level,
                    cause = %event.cause,
                    findings = event.findings.len(),
                    message = %event.message,
                    "CPU alert"
                );
            }
            AlertLevel::None => {}
        }
    }

    /// Log a degraded (zero-filled) sample
    pub fn log_sample_degraded(&self, iteration: u64, reason: &str) {
        warn!(
            event = "sample_degraded",
            node = %self.node_name,
            iteration = iteration,
            reason = %reason,
            "CPU read failed, tick continues with zero-filled sample"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "SRE agent shutting down"
        );
    }
}
