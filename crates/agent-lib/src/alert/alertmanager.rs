//! Alertmanager webhook formatting for raised alert events

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{AlertEvent, AlertLevel};
use crate::models::DerivedMetrics;

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (always "firing" for raised events)
    pub status: String,
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

impl AlertmanagerPayload {
    pub fn new(alerts: Vec<AlertmanagerAlert>) -> Self {
        Self { alerts }
    }
}

fn severity_label(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Fatal => "critical",
        AlertLevel::Warn | AlertLevel::None => "warning",
    }
}

impl AlertEvent {
    /// Format a raised event for Alertmanager. Returns `None` when nothing fired.
    pub fn to_alertmanager(
        &self,
        node_name: &str,
        metrics: &DerivedMetrics,
        timestamp: &str,
    ) -> Option<AlertmanagerAlert> {
        if !self.raised {
            return None;
        }

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), "HostCPUUtilization".to_string());
        labels.insert("severity".to_string(), severity_label(self.level).to_string());
        labels.insert("level".to_string(), self.level.to_string());
        labels.insert("cause".to_string(), self.cause.to_string());
        labels.insert("node".to_string(), node_name.to_string());

        let mut annotations = HashMap::new();
        annotations.insert(
            "summary".to_string(),
            format!("CPU {} on node {}", self.level, node_name),
        );
        annotations.insert("description".to_string(), self.message.clone());
        annotations.insert(
            "utilization".to_string(),
            format!("{:.2}", metrics.utilization),
        );
        annotations.insert(
            "saturation".to_string(),
            format!("{:.2}", metrics.saturation),
        );
        annotations.insert("findings".to_string(), self.findings.len().to_string());

        Some(AlertmanagerAlert {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: timestamp.to_string(),
            ends_at: None,
            generator_url: None,
        })
    }
}
