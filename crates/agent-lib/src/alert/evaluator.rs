//! Threshold rule evaluation
//!
//! The aggregate value is checked against the `cpu` band first, then every
//! core in index order against the `anycpu` band. Warnings accumulate; the
//! first engineered-point breach ends evaluation immediately.

use serde::{Deserialize, Serialize};

use crate::models::DerivedMetrics;
use crate::thresholds::{Bounds, ThresholdConfig};

/// Alert severity. Serializes to `""`, `"warn"` or `"fatal"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "fatal")]
    Fatal,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "",
            AlertLevel::Warn => "warn",
            AlertLevel::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which rule fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCause {
    #[default]
    None,
    LowUtilization,
    HighUtilizationDesign,
    HighUtilizationEngineered,
}

impl std::fmt::Display for AlertCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCause::None => write!(f, "None"),
            AlertCause::LowUtilization => write!(f, "LowUtilization"),
            AlertCause::HighUtilizationDesign => write!(f, "HighUtilizationDesign"),
            AlertCause::HighUtilizationEngineered => write!(f, "HighUtilizationEngineered"),
        }
    }
}

/// What a finding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Aggregate,
    Core(usize),
}

/// Which point of a band was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breach {
    BelowLow,
    AboveDesign,
    /// Ends evaluation
    AboveEngineered,
}

impl Breach {
    pub fn level(&self) -> AlertLevel {
        match self {
            Breach::AboveEngineered => AlertLevel::Fatal,
            Breach::BelowLow | Breach::AboveDesign => AlertLevel::Warn,
        }
    }

    pub fn cause(&self) -> AlertCause {
        match self {
            Breach::BelowLow => AlertCause::LowUtilization,
            Breach::AboveDesign => AlertCause::HighUtilizationDesign,
            Breach::AboveEngineered => AlertCause::HighUtilizationEngineered,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Breach::BelowLow => "below low design point",
            Breach::AboveDesign => "above design point",
            Breach::AboveEngineered => "above engineered point",
        }
    }
}

/// One rule that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub subject: Subject,
    pub value: f64,
    pub breach: Breach,
}

impl Finding {
    /// Human-readable text for this finding
    pub fn message(&self) -> String {
        let point = self.breach.describe();

        match self.subject {
            Subject::Aggregate => format!("Overall CPU {}", point),
            Subject::Core(index) => format!("CPU {} {}: {:.6}", index, point, self.value),
        }
    }
}

/// Result of checking one value against one band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Clean,
    Breach(Breach),
}

/// Apply the three-way rule. Order matters: low is checked before
/// engineered, engineered before design.
pub fn check(value: f64, bounds: &Bounds) -> RuleOutcome {
    if value < bounds.low {
        RuleOutcome::Breach(Breach::BelowLow)
    } else if value > bounds.engineered {
        RuleOutcome::Breach(Breach::AboveEngineered)
    } else if value > bounds.design {
        RuleOutcome::Breach(Breach::AboveDesign)
    } else {
        RuleOutcome::Clean
    }
}

/// Ordered accumulator of findings for one evaluation
#[derive(Debug, Clone, Default)]
pub struct FindingSet {
    findings: Vec<Finding>,
    terminated: bool,
}

impl FindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `subject`. Returns `false` once evaluation must stop.
    pub fn record(&mut self, subject: Subject, value: f64, outcome: RuleOutcome) -> bool {
        if let RuleOutcome::Breach(breach) = outcome {
            self.findings.push(Finding {
                subject,
                value,
                breach,
            });
            self.terminated |= breach == Breach::AboveEngineered;
        }

        !self.terminated
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Collapse into the event returned to the caller
    pub fn into_event(self) -> AlertEvent {
        let (level, cause) = self
            .findings
            .last()
            .map(|f| (f.breach.level(), f.breach.cause()))
            .unwrap_or_default();

        let message = self
            .findings
            .iter()
            .map(Finding::message)
            .collect::<Vec<_>>()
            .join(" ");

        AlertEvent {
            message,
            level,
            raised: !self.findings.is_empty(),
            cause,
            findings: self.findings,
        }
    }
}

/// Outcome of one evaluation, built fresh every tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub message: String,
    pub level: AlertLevel,
    pub raised: bool,
    pub cause: AlertCause,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl AlertEvent {
    /// The `(message, level, raised, cause)` tuple handed to alert routing
    pub fn as_tuple(&self) -> (&str, &'static str, bool, String) {
        (
            &self.message,
            self.level.as_str(),
            self.raised,
            self.cause.to_string(),
        )
    }
}

/// Evaluate derived metrics against the configured thresholds
pub fn evaluate(metrics: &DerivedMetrics, thresholds: &ThresholdConfig) -> AlertEvent {
    let mut findings = FindingSet::new();

    let aggregate = metrics.average;
    if !findings.record(
        Subject::Aggregate,
        aggregate,
        check(aggregate, &thresholds.cpu),
    ) {
        return findings.into_event();
    }

    for (index, &value) in metrics.per_core.iter().enumerate() {
        if !findings.record(Subject::Core(index), value, check(value, &thresholds.anycpu)) {
            break;
        }
    }

    findings.into_event()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{aggregate, SaturationPolicy};
    use crate::models::{HostSpec, RawSample};
    use crate::thresholds::PluginTuning;

    fn thresholds(cpu: Bounds, anycpu: Bounds) -> ThresholdConfig {
        ThresholdConfig::new(cpu, anycpu, PluginTuning::default()).unwrap()
    }

    fn metrics(per_core: &[f64]) -> DerivedMetrics {
        let host = HostSpec {
            rated_frequency_mhz: 2000.0,
            num_cores: per_core.len(),
        };
        let raw = RawSample {
            utilization_per_core: per_core.to_vec(),
            rated_frequency_mhz: 2000.0,
            degraded: false,
        };
        aggregate(&raw, &host, SaturationPolicy::Direct)
    }

    /// Bands wide enough that per-core checks never fire
    fn quiet_anycpu() -> Bounds {
        Bounds::new(0.0, 100.0, 100.0)
    }

    #[test]
    fn test_scenario_all_clear() {
        let config = thresholds(Bounds::new(2.0, 60.0, 80.0), quiet_anycpu());
        let event = evaluate(&metrics(&[50.0, 52.0, 48.0]), &config);

        assert_eq!(event.level, AlertLevel::None);
        assert!(!event.raised);
        assert_eq!(event.cause, AlertCause::None);
        assert!(event.message.is_empty());
        assert!(event.findings.is_empty());
    }

    #[test]
    fn test_scenario_core_breach_short_circuits() {
        let config = thresholds(
            Bounds::new(0.0, 100.0, 100.0),
            Bounds::new(0.0, 75.0, 90.0),
        );
        let event = evaluate(&metrics(&[95.0, 10.0]), &config);

        assert_eq!(event.level, AlertLevel::Fatal);
        assert!(event.raised);
        assert_eq!(event.cause, AlertCause::HighUtilizationEngineered);
        assert_eq!(event.message, "CPU 0 above engineered point: 95.000000");
        assert!(!event.message.contains("CPU 1"));
        assert_eq!(event.findings.len(), 1);
    }

    #[test]
    fn test_scenario_zero_fill_is_low_utilization() {
        let config = thresholds(Bounds::new(2.0, 60.0, 80.0), quiet_anycpu());
        let event = evaluate(&metrics(&[0.0, 0.0, 0.0, 0.0]), &config);

        assert_eq!(event.level, AlertLevel::Warn);
        assert_eq!(event.cause, AlertCause::LowUtilization);
        assert_eq!(event.message, "Overall CPU below low design point");
    }

    #[test]
    fn test_aggregate_engineered_breach_skips_cores() {
        let config = thresholds(
            Bounds::new(2.0, 60.0, 80.0),
            Bounds::new(0.0, 75.0, 90.0),
        );
        let event = evaluate(&metrics(&[95.0, 96.0]), &config);

        assert_eq!(event.level, AlertLevel::Fatal);
        assert_eq!(event.message, "Overall CPU above engineered point");
        assert_eq!(event.findings.len(), 1);
        assert_eq!(event.findings[0].subject, Subject::Aggregate);
    }

    #[test]
    fn test_warnings_accumulate_before_fatal() {
        let config = thresholds(
            Bounds::new(2.0, 60.0, 80.0),
            Bounds::new(5.0, 75.0, 90.0),
        );
        // average 61.25: aggregate above design
        let event = evaluate(&metrics(&[80.0, 1.0, 95.0, 69.0]), &config);

        assert_eq!(event.level, AlertLevel::Fatal);
        assert_eq!(event.cause, AlertCause::HighUtilizationEngineered);
        assert_eq!(
            event.message,
            "Overall CPU above design point \
             CPU 0 above design point: 80.000000 \
             CPU 1 below low design point: 1.000000 \
             CPU 2 above engineered point: 95.000000"
        );
        assert!(!event.message.contains("CPU 3"));
    }

    #[test]
    fn test_cores_after_breach_not_reported() {
        let config = thresholds(
            Bounds::new(0.0, 100.0, 100.0),
            Bounds::new(20.0, 75.0, 90.0),
        );
        let event = evaluate(&metrics(&[50.0, 91.0, 5.0, 80.0, 99.0]), &config);

        assert_eq!(event.level, AlertLevel::Fatal);
        assert_eq!(event.findings.len(), 1);
        assert_eq!(event.findings[0].subject, Subject::Core(1));
        for later in ["CPU 2", "CPU 3", "CPU 4"] {
            assert!(!event.message.contains(later));
        }
    }

    #[test]
    fn test_multiple_warnings_without_fatal() {
        let config = thresholds(
            Bounds::new(0.0, 100.0, 100.0),
            Bounds::new(10.0, 75.0, 90.0),
        );
        let event = evaluate(&metrics(&[5.0, 80.0, 50.0]), &config);

        assert_eq!(event.level, AlertLevel::Warn);
        assert!(event.raised);
        // Last finding decides the cause
        assert_eq!(event.cause, AlertCause::HighUtilizationDesign);
        assert_eq!(event.findings.len(), 2);
        assert!(event.message.contains("CPU 0 below low design point"));
        assert!(event.message.contains("CPU 1 above design point"));
    }

    #[test]
    fn test_threshold_monotonicity() {
        let bounds = Bounds::new(20.0, 60.0, 80.0);
        let descending = [95.0, 80.5, 80.0, 70.0, 60.0, 40.0, 20.0, 19.5, 0.0];
        let expected = [
            RuleOutcome::Breach(Breach::AboveEngineered),
            RuleOutcome::Breach(Breach::AboveEngineered),
            RuleOutcome::Breach(Breach::AboveDesign),
            RuleOutcome::Breach(Breach::AboveDesign),
            RuleOutcome::Clean,
            RuleOutcome::Clean,
            RuleOutcome::Clean,
            RuleOutcome::Breach(Breach::BelowLow),
            RuleOutcome::Breach(Breach::BelowLow),
        ];

        let outcomes: Vec<_> = descending.iter().map(|&v| check(v, &bounds)).collect();
        assert_eq!(outcomes, expected);
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let bounds = Bounds::new(10.0, 50.0, 90.0);
        assert_eq!(check(10.0, &bounds), RuleOutcome::Clean);
        assert_eq!(check(50.0, &bounds), RuleOutcome::Clean);
        assert_eq!(
            check(90.0, &bounds),
            RuleOutcome::Breach(Breach::AboveDesign)
        );
    }

    #[test]
    fn test_low_checked_before_engineered() {
        // Degenerate band where a value is both below low and above engineered
        let bounds = Bounds {
            low: 50.0,
            design: 10.0,
            engineered: 20.0,
        };
        assert_eq!(
            check(30.0, &bounds),
            RuleOutcome::Breach(Breach::BelowLow)
        );
    }

    #[test]
    fn test_finding_set_stops_after_terminal() {
        let mut set = FindingSet::new();
        assert!(set.record(Subject::Aggregate, 1.0, RuleOutcome::Breach(Breach::BelowLow)));
        assert!(!set.record(Subject::Core(0), 99.0, RuleOutcome::Breach(Breach::AboveEngineered)));
        assert!(set.is_terminated());
    }

    #[test]
    fn test_findings_always_carry_a_cause() {
        let config = thresholds(Bounds::new(2.0, 60.0, 80.0), Bounds::new(10.0, 75.0, 90.0));
        let event = evaluate(&metrics(&[70.0, 5.0, 85.0, 95.0]), &config);

        let breaches: Vec<_> = event.findings.iter().map(|f| f.breach).collect();
        assert_eq!(
            breaches,
            vec![
                Breach::AboveDesign,
                Breach::BelowLow,
                Breach::AboveDesign,
                Breach::AboveEngineered
            ]
        );
        for finding in &event.findings {
            assert_ne!(finding.breach.cause(), AlertCause::None);
            assert_ne!(finding.breach.level(), AlertLevel::None);
        }
        assert_eq!(event.level, Breach::AboveEngineered.level());

        let json = serde_json::to_value(&event.findings[1]).unwrap();
        assert_eq!(json["breach"], "below_low");
        assert_eq!(json["subject"]["core"], 1);
    }

    #[test]
    fn test_alert_event_serialization() {
        let config = thresholds(Bounds::new(2.0, 60.0, 80.0), quiet_anycpu());
        let event = evaluate(&metrics(&[0.0, 0.0]), &config);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["level"], "warn");
        assert_eq!(json["cause"], "LowUtilization");
        assert_eq!(json["raised"], true);

        let clean = serde_json::to_value(AlertEvent::default()).unwrap();
        assert_eq!(clean["level"], "");
        assert_eq!(clean["cause"], "None");
    }

    #[test]
    fn test_as_tuple() {
        let config = thresholds(
            Bounds::new(0.0, 100.0, 100.0),
            Bounds::new(0.0, 75.0, 90.0),
        );
        let event = evaluate(&metrics(&[95.0, 10.0]), &config);
        let (message, level, raised, cause) = event.as_tuple();

        assert!(message.starts_with("CPU 0"));
        assert_eq!(level, "fatal");
        assert!(raised);
        assert_eq!(cause, "HighUtilizationEngineered");
    }
}
