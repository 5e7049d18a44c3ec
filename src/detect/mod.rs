//! Anomaly detection, pattern detection, and insight generation.

pub mod anomaly;
pub mod engine;
pub mod insight;
pub mod pattern;

use serde::{Deserialize, Serialize};

/// Severity levels shared by anomaly classification and insight ranking.
///
/// `Normal` only occurs on individual classifications; insights are built
/// from anomalous findings and carry `Critical`, `Warning`, or `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Normal,
}

impl Severity {
    /// Sort rank: critical sorts first, normal last. Total and consistent
    /// across every consumer so ranked output is reproducible.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
            Severity::Normal => 3,
        }
    }
}

/// Which side of the reference center a value falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}
