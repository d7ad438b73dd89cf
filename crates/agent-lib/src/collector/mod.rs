//! Host CPU sampling and the per-tick pipeline driver
//!
//! This module provides the [`CpuSource`] abstraction over the operating
//! system, a [`HostCpuSource`] backed by `sysinfo` and `/proc/stat`, the
//! [`Sampler`] that degrades to zero-filled readings on failure, and the
//! [`TickLoop`] that runs sample, aggregate and evaluate once per tick.

mod host;
mod r#loop;
mod sampler;


pub use host::{max_frequency_mhz, parse_proc_stat, HostCpuSource, USER_HZ};
pub use r#loop::{TickLoop, TickLoopBuilder, TickLoopConfig, TickReport};
pub use sampler::{validate_host, Sample, Sampler};

use crate::models::{CpuTimes, HostSpec};
use std::time::Duration;
use thiserror::Error;

/// Recoverable per-tick read failures
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("expected {expected} cores, got {actual}")]
    CoreCountMismatch { expected: usize, actual: usize },

    #[error("CPU information unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw CPU readings
pub trait CpuSource: Send {
    /// Current utilization percentage (0-100) of every logical core
    fn per_core_percent(&mut self) -> Result<Vec<f64>, SampleError>;

    /// Rated frequency of core 0 and the logical core count
    fn host_spec(&mut self) -> Result<HostSpec, SampleError>;

    /// Cumulative per-core time accounting
    fn cpu_times(&mut self) -> Result<Vec<CpuTimes>, SampleError>;

    /// Shortest gap between two utilization reads that yields a usable value
    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}
