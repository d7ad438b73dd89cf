//! Core data models for the SRE agent

use serde::{Deserialize, Serialize};

/// Static description of the host CPU, read once at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Rated clock frequency of core 0 in MHz
    pub rated_frequency_mhz: f64,
    /// Number of logical cores
    pub num_cores: usize,
}

/// Per-core utilization reading for a single tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Utilization percentage (0-100) per logical core, in core order
    pub utilization_per_core: Vec<f64>,
    /// Rated clock frequency in MHz
    pub rated_frequency_mhz: f64,
    /// True when the reading failed and the vector is a zero-fill
    #[serde(default)]
    pub degraded: bool,
}

impl RawSample {
    /// Zero-filled sample used when the host read fails
    pub fn zeroed(host: &HostSpec) -> Self {
        Self {
            utilization_per_core: vec![0.0; host.num_cores],
            rated_frequency_mhz: host.rated_frequency_mhz,
            degraded: true,
        }
    }
}

/// Cumulative per-core CPU time accounting, in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTimes {
    pub cpu: String,
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
}

impl CpuTimes {
    /// Time-accounting modes paired with their values, for export
    pub fn modes(&self) -> [(&'static str, f64); 8] {
        [
            ("user", self.user),
            ("nice", self.nice),
            ("system", self.system),
            ("idle", self.idle),
            ("iowait", self.iowait),
            ("irq", self.irq),
            ("softirq", self.softirq),
            ("steal", self.steal),
        ]
    }
}

/// USE summary derived from one raw sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub per_core: Vec<f64>,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub utilization: f64,
    pub saturation: f64,
    pub errors: f64,
    pub latency_ms_per_op: f64,
    pub throughput_mhz_effective: f64,
    pub throughput_max_mhz: f64,
    #[serde(default)]
    pub degraded: bool,
}

impl DerivedMetrics {
    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from the JSON wire form
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_sample_matches_core_count() {
        let host = HostSpec {
            rated_frequency_mhz: 2400.0,
            num_cores: 4,
        };
        let sample = RawSample::zeroed(&host);

        assert_eq!(sample.utilization_per_core, vec![0.0; 4]);
        assert_eq!(sample.rated_frequency_mhz, 2400.0);
        assert!(sample.degraded);
    }

    #[test]
    fn test_derived_metrics_json_round_trip() {
        let metrics = DerivedMetrics {
            per_core: vec![12.5, 87.5, 50.0],
            average: 50.0,
            max: 87.5,
            min: 12.5,
            utilization: 50.0,
            saturation: 109.375,
            errors: 0.0,
            latency_ms_per_op: 0.5,
            throughput_mhz_effective: 3000.0,
            throughput_max_mhz: 6000.0,
            degraded: false,
        };

        let json = metrics.to_json().unwrap();
        let parsed = DerivedMetrics::from_json(&json).unwrap();

        assert_eq!(parsed, metrics);
    }

    #[test]
    fn test_cpu_times_modes_order() {
        let times = CpuTimes {
            cpu: "cpu0".to_string(),
            user: 1.0,
            steal: 8.0,
            ..Default::default()
        };
        let modes = times.modes();

        assert_eq!(modes[0], ("user", 1.0));
        assert_eq!(modes[7], ("steal", 8.0));
    }
}
