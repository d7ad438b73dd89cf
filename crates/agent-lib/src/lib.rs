//! Agent library for host CPU USE monitoring
//!
//! This crate provides the core functionality for:
//! - Sampling per-core CPU utilization from the host
//! - Aggregating readings into a USE (Utilization/Saturation/Errors,
//!   Throughput/Latency) summary
//! - Evaluating the summary against low/design/engineered thresholds
//! - Health checks and observability

pub mod aggregator;
pub mod alert;
pub mod collector;
pub mod health;
pub mod models;
pub mod observability;
pub mod thresholds;

pub use aggregator::{aggregate, Aggregator, AggregatorSettings, MetricsSink, SaturationPolicy};
pub use alert::{evaluate, AlertCause, AlertEvent, AlertLevel};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use thresholds::{Bounds, ConfigError, PluginTuning, ThresholdConfig};
