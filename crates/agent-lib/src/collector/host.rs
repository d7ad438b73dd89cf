//! Host CPU readings from the operating system
//!
//! Utilization comes from `sysinfo`. The rated frequency is the cpufreq
//! maximum of core 0, falling back to the `sysinfo` frequency where cpufreq
//! is absent. Cumulative per-core time accounting is parsed from `/proc/stat`.

use super::{CpuSource, SampleError};
use crate::models::{CpuTimes, HostSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

/// Kernel clock ticks per second used by `/proc/stat`
pub const USER_HZ: f64 = 100.0;

/// [`CpuSource`] reading the local host
pub struct HostCpuSource {
    system: System,
    proc_path: PathBuf,
    sys_path: PathBuf,
}

impl HostCpuSource {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Create a source with a custom proc path (for testing)
    pub fn with_proc_path(proc_path: impl Into<PathBuf>) -> Self {
        Self::with_roots(proc_path, "/sys")
    }

    /// Create a source with custom proc and sys roots (for testing)
    pub fn with_roots(proc_path: impl Into<PathBuf>, sys_path: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();

        Self {
            system,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
        }
    }
}

/// Maximum frequency of core 0 in MHz from cpufreq, if the host exposes it
pub fn max_frequency_mhz(sys_root: &Path) -> Option<f64> {
    let path = sys_root.join("devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq");
    let content = std::fs::read_to_string(&path).ok()?;

    match content.trim().parse::<u64>() {
        Ok(khz) if khz > 0 => Some(khz as f64 / 1000.0),
        _ => {
            debug!(path = %path.display(), value = %content.trim(), "Ignoring unusable cpufreq maximum");
            None
        }
    }
}

impl Default for HostCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for HostCpuSource {
    fn per_core_percent(&mut self) -> Result<Vec<f64>, SampleError> {
        self.system.refresh_cpu_usage();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SampleError::Unavailable("no CPUs reported".to_string()));
        }

        Ok(cpus.iter().map(|cpu| cpu.cpu_usage() as f64).collect())
    }

    fn host_spec(&mut self) -> Result<HostSpec, SampleError> {
        self.system.refresh_cpu_frequency();

        let cpus = self.system.cpus();
        let first = cpus
            .first()
            .ok_or_else(|| SampleError::Unavailable("no CPUs reported".to_string()))?;

        // sysinfo reports the current (scaled) clock, not the rated one
        let rated_frequency_mhz =
            max_frequency_mhz(&self.sys_path).unwrap_or(first.frequency() as f64);

        Ok(HostSpec {
            rated_frequency_mhz,
            num_cores: cpus.len(),
        })
    }

    fn cpu_times(&mut self) -> Result<Vec<CpuTimes>, SampleError> {
        let path = self.proc_path.join("stat");
        let content = std::fs::read_to_string(&path).map_err(|source| SampleError::Io {
            path: path.display().to_string(),
            source,
        })?;

        parse_proc_stat(&content, USER_HZ)
    }

    fn min_interval(&self) -> Duration {
        sysinfo::MINIMUM_CPU_UPDATE_INTERVAL
    }
}

/// Parse the per-core `cpuN` lines of `/proc/stat`, converting ticks to seconds.
/// The aggregate `cpu` line is skipped. Missing trailing columns read as zero.
pub fn parse_proc_stat(content: &str, ticks_per_sec: f64) -> Result<Vec<CpuTimes>, SampleError> {
    let mut times = Vec::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else {
            continue;
        };

        let is_core = label
            .strip_prefix("cpu")
            .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);
        if !is_core {
            continue;
        }

        let mut fields = [0u64; 8];
        for (slot, raw) in fields.iter_mut().zip(parts) {
            *slot = raw.parse().map_err(|_| SampleError::Parse {
                what: "/proc/stat",
                detail: format!("{}: invalid counter {:?}", label, raw),
            })?;
        }

        let secs = |ticks: u64| ticks as f64 / ticks_per_sec;
        times.push(CpuTimes {
            cpu: label.to_string(),
            user: secs(fields[0]),
            nice: secs(fields[1]),
            system: secs(fields[2]),
            idle: secs(fields[3]),
            iowait: secs(fields[4]),
            irq: secs(fields[5]),
            softirq: secs(fields[6]),
            steal: secs(fields[7]),
        });
    }

    if times.is_empty() {
        return Err(SampleError::Parse {
            what: "/proc/stat",
            detail: "no per-core cpu lines".to_string(),
        });
    }

    Ok(times)
}
