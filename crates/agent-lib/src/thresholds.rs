//! Alert threshold configuration
//!
//! The threshold document is parsed once at startup into a strongly typed
//! [`ThresholdConfig`]. Every field is validated before the first tick runs,
//! so the evaluator never has to handle a malformed bound.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::aggregator::SaturationPolicy;
use crate::collector::SampleError;

/// Subject name for the aggregate CPU value
pub const SUBJECT_CPU: &str = "cpu";
/// Subject name applied to each individual core
pub const SUBJECT_ANY_CPU: &str = "anycpu";

/// Threshold document used when no file is configured
pub const DEFAULT_THRESHOLDS_JSON: &str = r#"{
    "alert": {
        "cpu":    { "low": 2.0, "design": 60.0, "engineered": 80.0 },
        "anycpu": { "low": 0.0, "design": 75.0, "engineered": 90.0 }
    },
    "plugin": { "config": { "sampleEvery": 1 } }
}"#;

/// Initialization errors. Any of these prevents the agent from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read threshold document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed threshold document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{subject}.{field} must be a finite number, got {value}")]
    NonFinite {
        subject: &'static str,
        field: &'static str,
        value: f64,
    },

    #[error("{subject}: low ({low}) must not exceed design ({design})")]
    LowAboveDesign {
        subject: &'static str,
        low: f64,
        design: f64,
    },

    #[error("{subject}: design ({design}) must not exceed engineered ({engineered})")]
    DesignAboveEngineered {
        subject: &'static str,
        design: f64,
        engineered: f64,
    },

    #[error("plugin.config.sampleEvery must be at least 1")]
    ZeroSampleEvery,

    #[error("plugin.config.saturation must be in (0, 100], got {0}")]
    SaturationReference(f64),

    #[error("host reports zero CPU cores")]
    NoCores,

    #[error("rated CPU frequency must be positive, got {0} MHz")]
    InvalidFrequency(f64),

    #[error("failed to read host CPU description")]
    HostInfo(#[source] SampleError),
}

/// Three-tier threshold band for one subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: f64,
    pub design: f64,
    pub engineered: f64,
}

impl Bounds {
    pub fn new(low: f64, design: f64, engineered: f64) -> Self {
        Self {
            low,
            design,
            engineered,
        }
    }

    fn validate(&self, subject: &'static str) -> Result<(), ConfigError> {
        for (field, value) in [
            ("low", self.low),
            ("design", self.design),
            ("engineered", self.engineered),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    subject,
                    field,
                    value,
                });
            }
        }

        if self.low > self.design {
            return Err(ConfigError::LowAboveDesign {
                subject,
                low: self.low,
                design: self.design,
            });
        }

        if self.design > self.engineered {
            return Err(ConfigError::DesignAboveEngineered {
                subject,
                design: self.design,
                engineered: self.engineered,
            });
        }

        Ok(())
    }
}

/// Plugin-level tuning carried alongside the alert bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PluginTuning {
    /// Saturation reference percentage; selects the referenced policy when set
    pub saturation: Option<f64>,
    /// Secondary CPU-times read cadence in ticks
    pub sample_every: u64,
}

impl Default for PluginTuning {
    fn default() -> Self {
        Self {
            saturation: None,
            sample_every: 1,
        }
    }
}

/// Validated alert thresholds, immutable after startup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdConfig {
    pub cpu: Bounds,
    pub anycpu: Bounds,
    pub tuning: PluginTuning,
}

#[derive(Deserialize)]
struct Document {
    alert: AlertSection,
    #[serde(default)]
    plugin: Option<PluginSection>,
}

#[derive(Deserialize)]
struct AlertSection {
    cpu: Bounds,
    anycpu: Bounds,
}

#[derive(Deserialize)]
struct PluginSection {
    #[serde(default)]
    config: Option<TuningSection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TuningSection {
    #[serde(default)]
    saturation: Option<f64>,
    #[serde(default)]
    sample_every: Option<u64>,
}

impl ThresholdConfig {
    /// Build from already-parsed bands, validating them
    pub fn new(cpu: Bounds, anycpu: Bounds, tuning: PluginTuning) -> Result<Self, ConfigError> {
        cpu.validate(SUBJECT_CPU)?;
        anycpu.validate(SUBJECT_ANY_CPU)?;

        if tuning.sample_every == 0 {
            return Err(ConfigError::ZeroSampleEvery);
        }

        if let Some(reference) = tuning.saturation {
            if !reference.is_finite() || reference <= 0.0 || reference > 100.0 {
                return Err(ConfigError::SaturationReference(reference));
            }
        }

        Ok(Self {
            cpu,
            anycpu,
            tuning,
        })
    }

    /// Parse and validate a JSON threshold document
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let doc: Document = serde_json::from_str(document)?;

        let tuning = match doc.plugin.and_then(|p| p.config) {
            Some(section) => PluginTuning {
                saturation: section.saturation,
                sample_every: section.sample_every.unwrap_or(1),
            },
            None => PluginTuning::default(),
        };

        Self::new(doc.alert.cpu, doc.alert.anycpu, tuning)
    }

    /// Read, parse and validate a JSON threshold document from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json_str(&content)
    }

    /// Saturation formula selected by the tuning section
    pub fn saturation_policy(&self) -> SaturationPolicy {
        match self.tuning.saturation {
            Some(reference_percent) => SaturationPolicy::Referenced { reference_percent },
            None => SaturationPolicy::Direct,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: Bounds::new(2.0, 60.0, 80.0),
            anycpu: Bounds::new(0.0, 75.0, 90.0),
            tuning: PluginTuning::default(),
        }
    }
}
