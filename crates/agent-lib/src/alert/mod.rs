//! Threshold alerting for derived CPU metrics
//!
//! This module provides:
//! - Three-tier rule evaluation (low / design / engineered) over the
//!   aggregate value and each core
//! - Alertmanager webhook formatting for raised events

mod alertmanager;
mod evaluator;

pub use alertmanager::{AlertmanagerAlert, AlertmanagerPayload};
pub use evaluator::{
    check, evaluate, AlertCause, AlertEvent, AlertLevel, Breach, Finding, FindingSet, RuleOutcome,
    Subject,
};
