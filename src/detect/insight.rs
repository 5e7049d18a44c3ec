//! Insight records -- the unit handed to the presentation layer.
//!
//! Insights are flat, serializable data with no behavior so they can cross a
//! process boundary unchanged. Each carries a structured details payload
//! sufficient to reconstruct its message without re-running detection, and a
//! stable identifier derived from its source so consecutive refreshes can be
//! diffed.

use crate::detect::anomaly::ZScoreResult;
use crate::detect::pattern::{DegradationReport, SectorReport, Sequence, TimeBucket};
use crate::detect::Severity;
use serde::{Deserialize, Serialize};

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    VehicleAnomaly,
    SectorAnomaly,
    Pattern,
    Trend,
    SectorPattern,
    TimePattern,
}

/// A follow-up the presentation layer can offer for this insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum InsightAction {
    /// Narrow the dashboard to one vehicle.
    FilterVehicle(String),
}

/// Gap between a group's compliance rate and the batch baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGapDetails {
    pub rate: f64,
    pub baseline_rate: f64,
    pub delta_points: f64,
}

/// Structured evidence behind one insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum InsightDetails {
    ZScore(ZScoreResult),
    RateGap(RateGapDetails),
    Sequence(Sequence),
    Degradation(DegradationReport),
    Sector(SectorReport),
    TimeBucket(TimeBucket),
}

/// One ranked finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Stable identifier, e.g. `vehicle:RTW-5:response_time`.
    pub id: String,
    pub category: InsightCategory,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub details: InsightDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<InsightAction>,
}

/// The ranked, bounded result of one detection pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightBundle {
    pub critical: Vec<Insight>,
    pub warnings: Vec<Insight>,
    pub info: Vec<Insight>,
    pub all: Vec<Insight>,
}

impl InsightBundle {
    /// Build a bundle from findings in detection order: stable sort by
    /// severity rank, truncate to `max_insights` AFTER sorting, then derive
    /// the severity buckets from the truncated list.
    pub fn from_findings(mut findings: Vec<Insight>, max_insights: usize) -> Self {
        findings.sort_by_key(|i| i.severity.rank());
        findings.truncate(max_insights);

        let mut bundle = InsightBundle {
            all: findings,
            ..Default::default()
        };
        for insight in &bundle.all {
            match insight.severity {
                Severity::Critical => bundle.critical.push(insight.clone()),
                Severity::Warning => bundle.warnings.push(insight.clone()),
                _ => bundle.info.push(insight.clone()),
            }
        }
        bundle
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, severity: Severity) -> Insight {
        Insight {
            id: id.to_string(),
            category: InsightCategory::VehicleAnomaly,
            severity,
            title: id.to_string(),
            message: String::new(),
            details: InsightDetails::RateGap(RateGapDetails {
                rate: 50.0,
                baseline_rate: 80.0,
                delta_points: -30.0,
            }),
            action: None,
        }
    }

    #[test]
    fn test_sort_is_stable_within_severity() {
        let bundle = InsightBundle::from_findings(
            vec![
                finding("w1", Severity::Warning),
                finding("c1", Severity::Critical),
                finding("w2", Severity::Warning),
                finding("i1", Severity::Info),
                finding("c2", Severity::Critical),
            ],
            10,
        );

        let ids: Vec<&str> = bundle.all.iter().map(|i| i.id.as_str()).collect();
        // Severity rank first; detection order preserved inside each rank
        assert_eq!(ids, vec!["c1", "c2", "w1", "w2", "i1"]);
        assert_eq!(bundle.critical.len(), 2);
        assert_eq!(bundle.warnings.len(), 2);
        assert_eq!(bundle.info.len(), 1);
    }

    #[test]
    fn test_truncation_happens_after_sorting() {
        // 15 critical findings behind 5 warnings: truncation must keep the
        // criticals, not the first 10 in detection order.
        let mut findings: Vec<Insight> = (0..5)
            .map(|i| finding(&format!("w{i}"), Severity::Warning))
            .collect();
        findings.extend((0..15).map(|i| finding(&format!("c{i}"), Severity::Critical)));

        let bundle = InsightBundle::from_findings(findings, 10);
        assert_eq!(bundle.len(), 10);
        assert_eq!(bundle.critical.len(), 10);
        assert!(bundle.warnings.is_empty());
        assert!(bundle.info.is_empty());
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = InsightBundle::from_findings(Vec::new(), 10);
        assert!(bundle.is_empty());
        assert_eq!(bundle.len(), 0);
    }
}
