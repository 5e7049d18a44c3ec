//! Insight generation -- orchestrates every detector over one batch.
//!
//! The engine is synchronous and stateless: one call per dataset refresh,
//! nothing cached across calls. Global baseline samples are collected once
//! per invocation and handed read-only to every detector so all findings are
//! measured against the same snapshot. Vehicles and sectors are visited in
//! sorted key order, which keeps the output deterministic for a given batch.

use crate::config::EngineConfig;
use crate::detect::insight::{
    Insight, InsightAction, InsightBundle, InsightCategory, InsightDetails, RateGapDetails,
};
use crate::detect::pattern::{self, SectorIssue, TimeGrouping};
use crate::detect::{anomaly, Direction, Severity};
use crate::records::{self, DispatchRecord};
use tracing::{debug, info};

/// Read-only per-batch reference samples (the "global baseline").
struct BatchBaseline {
    response_times: Vec<f64>,
    travel_times: Vec<f64>,
    compliance_rate: Option<f64>,
    /// Observation counts per sector, in sector-name order.
    sector_counts: Vec<f64>,
}

impl BatchBaseline {
    fn collect(records: &[DispatchRecord]) -> Self {
        let refs: Vec<&DispatchRecord> = records.iter().collect();
        Self {
            response_times: records.iter().filter_map(|r| r.response_time).collect(),
            travel_times: records.iter().filter_map(|r| r.travel_time).collect(),
            compliance_rate: records::compliance_rate(&refs),
            sector_counts: records::group_by_sector(records)
                .values()
                .map(|g| g.len() as f64)
                .collect(),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Runs all detectors across a batch and assembles the ranked bundle.
pub struct InsightEngine {
    cfg: EngineConfig,
}

impl InsightEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    /// Run the full detection pass. Detectors that lack a sufficient sample
    /// or see no anomaly contribute nothing; an empty bundle is a normal
    /// outcome, not an error.
    pub fn generate(&self, records: &[DispatchRecord], max_insights: usize) -> InsightBundle {
        if records.is_empty() {
            return InsightBundle::default();
        }

        debug!(records = records.len(), "Starting insight scan");
        let baseline = BatchBaseline::collect(records);
        let mut findings = Vec::new();

        self.vehicle_anomalies(records, &baseline, &mut findings);
        self.sector_anomalies(records, &baseline, &mut findings);
        self.consecutive_missed(records, &mut findings);
        self.degradation(records, &mut findings);
        self.problem_sectors(records, &mut findings);
        self.worst_hour(records, &baseline, &mut findings);

        info!(
            records = records.len(),
            findings = findings.len(),
            "Insight scan complete"
        );
        InsightBundle::from_findings(findings, max_insights)
    }

    /// Per-vehicle pass: response-time and travel-time z-scores against the
    /// batch, plus the direct compliance-rate gap check.
    fn vehicle_anomalies(
        &self,
        records: &[DispatchRecord],
        baseline: &BatchBaseline,
        findings: &mut Vec<Insight>,
    ) {
        for (call_sign, group) in records::group_by_vehicle(records) {
            let responses: Vec<f64> = group.iter().filter_map(|r| r.response_time).collect();
            if let Some(avg) = mean(&responses) {
                if let Some(z) =
                    anomaly::detect_zscore(avg, &baseline.response_times, &self.cfg.anomaly)
                {
                    if z.is_anomaly {
                        findings.push(Insight {
                            id: format!("vehicle:{call_sign}:response_time"),
                            category: InsightCategory::VehicleAnomaly,
                            severity: z.severity,
                            title: format!("{call_sign}: response time anomaly"),
                            message: format!(
                                "{avg:.0}s vs fleet average {:.0}s ({:+.1}%, z-score {:.2})",
                                z.mean, z.percentage, z.z_score
                            ),
                            details: InsightDetails::ZScore(z),
                            action: Some(InsightAction::FilterVehicle(call_sign.clone())),
                        });
                    }
                }
            }

            let travels: Vec<f64> = group.iter().filter_map(|r| r.travel_time).collect();
            if let Some(avg) = mean(&travels) {
                if let Some(z) =
                    anomaly::detect_zscore(avg, &baseline.travel_times, &self.cfg.anomaly)
                {
                    if z.is_anomaly {
                        findings.push(Insight {
                            id: format!("vehicle:{call_sign}:travel_time"),
                            category: InsightCategory::VehicleAnomaly,
                            severity: z.severity,
                            title: format!("{call_sign}: travel time anomaly"),
                            message: format!(
                                "{avg:.0}s vs fleet average {:.0}s ({:+.1}%, z-score {:.2})",
                                z.mean, z.percentage, z.z_score
                            ),
                            details: InsightDetails::ZScore(z),
                            action: Some(InsightAction::FilterVehicle(call_sign.clone())),
                        });
                    }
                }
            }

            if let Some(gap) = self.rate_gap(&group, baseline) {
                findings.push(Insight {
                    id: format!("vehicle:{call_sign}:compliance_rate"),
                    category: InsightCategory::VehicleAnomaly,
                    severity: gap.0,
                    title: format!("{call_sign}: compliance rate anomaly"),
                    message: format!(
                        "{:.1}% (baseline {:.1}%), {:.1} points below average",
                        gap.1.rate,
                        gap.1.baseline_rate,
                        -gap.1.delta_points
                    ),
                    details: InsightDetails::RateGap(gap.1),
                    action: Some(InsightAction::FilterVehicle(call_sign.clone())),
                });
            }
        }
    }

    /// Per-sector pass: observation-count z-score against the per-sector
    /// count distribution, compliance-rate gap, and travel-time z-score.
    /// Travel time and volume only flag sectors sitting ABOVE baseline --
    /// an unusually quiet or fast sector is not a problem.
    fn sector_anomalies(
        &self,
        records: &[DispatchRecord],
        baseline: &BatchBaseline,
        findings: &mut Vec<Insight>,
    ) {
        for (sector, group) in records::group_by_sector(records) {
            if let Some(z) = anomaly::detect_zscore(
                group.len() as f64,
                &baseline.sector_counts,
                &self.cfg.anomaly,
            ) {
                if z.is_anomaly && z.direction == Direction::Above {
                    findings.push(Insight {
                        id: format!("sector:{sector}:dispatch_volume"),
                        category: InsightCategory::SectorAnomaly,
                        severity: z.severity,
                        title: format!("Sector {sector}: dispatch volume anomaly"),
                        message: format!(
                            "{} dispatches (sector average {:.0}), {:.0}% above normal",
                            group.len(),
                            z.mean,
                            z.percentage
                        ),
                        details: InsightDetails::ZScore(z),
                        action: None,
                    });
                }
            }

            if let Some(gap) = self.rate_gap(&group, baseline) {
                findings.push(Insight {
                    id: format!("sector:{sector}:compliance_rate"),
                    category: InsightCategory::SectorAnomaly,
                    severity: gap.0,
                    title: format!("Sector {sector}: compliance rate anomaly"),
                    message: format!(
                        "{:.1}% (baseline {:.1}%), {:.1} points below average",
                        gap.1.rate,
                        gap.1.baseline_rate,
                        -gap.1.delta_points
                    ),
                    details: InsightDetails::RateGap(gap.1),
                    action: None,
                });
            }

            let travels: Vec<f64> = group.iter().filter_map(|r| r.travel_time).collect();
            if let Some(avg) = mean(&travels) {
                if let Some(z) =
                    anomaly::detect_zscore(avg, &baseline.travel_times, &self.cfg.anomaly)
                {
                    if z.is_anomaly && z.direction == Direction::Above {
                        findings.push(Insight {
                            id: format!("sector:{sector}:travel_time"),
                            category: InsightCategory::SectorAnomaly,
                            severity: z.severity,
                            title: format!("Sector {sector}: travel time anomaly"),
                            message: format!(
                                "{avg:.0}s (baseline {:.0}s), {:.1}% above average",
                                z.mean, z.percentage
                            ),
                            details: InsightDetails::ZScore(z),
                            action: None,
                        });
                    }
                }
            }
        }
    }

    /// Compliance-rate gap of one group against the batch. Returns the
    /// severity and details only when the gap crosses the warning bound.
    fn rate_gap(
        &self,
        group: &[&DispatchRecord],
        baseline: &BatchBaseline,
    ) -> Option<(Severity, RateGapDetails)> {
        let rate = records::compliance_rate(group)?;
        let baseline_rate = baseline.compliance_rate?;
        let delta = rate - baseline_rate;

        if delta >= -self.cfg.insights.rate_gap_warning {
            return None;
        }

        let severity = if delta < -self.cfg.insights.rate_gap_critical {
            Severity::Critical
        } else {
            Severity::Warning
        };
        Some((
            severity,
            RateGapDetails {
                rate,
                baseline_rate,
                delta_points: delta,
            },
        ))
    }

    /// Runs of consecutively missed compliance targets, per vehicle. One
    /// insight per affected vehicle, carrying its longest run.
    fn consecutive_missed(&self, records: &[DispatchRecord], findings: &mut Vec<Insight>) {
        for (call_sign, group) in records::group_by_vehicle(records) {
            let sequences = pattern::consecutive_events(
                &group,
                |r| r.compliance_met == Some(false),
                self.cfg.pattern.run_min_length,
                &self.cfg.pattern,
            );

            let Some(longest) = sequences.iter().max_by_key(|s| s.count).cloned() else {
                continue;
            };
            let severity = if sequences.iter().any(|s| s.severity == Severity::Critical) {
                Severity::Critical
            } else {
                Severity::Warning
            };

            findings.push(Insight {
                id: format!("vehicle:{call_sign}:consecutive_missed"),
                category: InsightCategory::Pattern,
                severity,
                title: format!(
                    "{call_sign}: {} consecutive missed compliance targets",
                    longest.count
                ),
                message: format!(
                    "Between {} and {}, {} dispatches in a row missed the compliance target.",
                    longest.started_at.format("%Y-%m-%d %H:%M"),
                    longest.ended_at.format("%Y-%m-%d %H:%M"),
                    longest.count
                ),
                details: InsightDetails::Sequence(longest),
                action: Some(InsightAction::FilterVehicle(call_sign.clone())),
            });
        }
    }

    /// Single recent-vs-baseline degradation check over the whole batch.
    fn degradation(&self, records: &[DispatchRecord], findings: &mut Vec<Insight>) {
        let Some(report) = pattern::performance_degradation(records, &self.cfg.pattern) else {
            return;
        };
        if !report.is_degrading {
            return;
        }

        let mut parts = Vec::new();
        if let Some(d) = report.response.as_ref().filter(|d| d.is_degrading) {
            parts.push(format!("response time {:+.1}%", d.delta_percent));
        }
        if let Some(d) = report.travel.as_ref().filter(|d| d.is_degrading) {
            parts.push(format!("travel time {:+.1}%", d.delta_percent));
        }
        if let Some(d) = report.compliance.as_ref().filter(|d| d.is_degrading) {
            parts.push(format!("compliance rate {:+.1} points", d.delta_points));
        }

        findings.push(Insight {
            id: format!("degradation:{}h", self.cfg.pattern.degradation_current_hours),
            category: InsightCategory::Trend,
            severity: report.severity,
            title: format!(
                "Performance degrading ({}h vs {}h baseline)",
                self.cfg.pattern.degradation_current_hours,
                self.cfg.pattern.degradation_baseline_hours
            ),
            message: parts.join(", "),
            details: InsightDetails::Degradation(report),
            action: None,
        });
    }

    /// Top problem sectors, already ranked by the pattern detector.
    fn problem_sectors(&self, records: &[DispatchRecord], findings: &mut Vec<Insight>) {
        let reports = pattern::problem_sectors(records, &self.cfg.pattern);

        for report in reports
            .into_iter()
            .take(self.cfg.insights.top_problem_sectors)
        {
            let mut parts = Vec::new();
            if report.issues.contains(&SectorIssue::TravelTime) {
                if let Some(t) = report.mean_travel {
                    let pct = (t / report.baseline_travel - 1.0) * 100.0;
                    parts.push(format!("travel time {pct:+.0}% vs batch mean"));
                }
            }
            if report.issues.contains(&SectorIssue::ComplianceRate) {
                if let Some(r) = report.compliance_rate {
                    parts.push(format!(
                        "compliance {r:.1}% ({:.1} points below batch)",
                        report.baseline_compliance - r
                    ));
                }
            }

            findings.push(Insight {
                id: format!("sector:{}:problem", report.sector),
                category: InsightCategory::SectorPattern,
                severity: report.severity,
                title: format!(
                    "Problem sector: {} ({} dispatches)",
                    report.sector, report.count
                ),
                message: parts.join(", "),
                details: InsightDetails::Sector(report),
                action: None,
            });
        }
    }

    /// At most one informational insight for the worst hour of day: the
    /// lowest-compliance hour with enough observations, if it falls under
    /// the configured bound.
    fn worst_hour(
        &self,
        records: &[DispatchRecord],
        baseline: &BatchBaseline,
        findings: &mut Vec<Insight>,
    ) {
        let buckets = pattern::time_patterns(records, TimeGrouping::Hour);

        let mut worst: Option<&pattern::TimeBucket> = None;
        for bucket in &buckets {
            if bucket.count < self.cfg.insights.worst_hour_min_count {
                continue;
            }
            let Some(rate) = bucket.compliance_rate else {
                continue;
            };
            if worst.map_or(true, |w| rate < w.compliance_rate.unwrap_or(100.0)) {
                worst = Some(bucket);
            }
        }

        let Some(bucket) = worst else { return };
        let rate = bucket.compliance_rate.unwrap_or(100.0);
        if rate >= self.cfg.insights.worst_hour_rate_bound {
            return;
        }

        findings.push(Insight {
            id: "time:worst_hour".to_string(),
            category: InsightCategory::TimePattern,
            severity: Severity::Info,
            title: format!("Problematic hour: {}", bucket.label),
            message: format!(
                "Compliance rate only {rate:.1}% across {} dispatches (batch average {:.1}%)",
                bucket.count,
                baseline.compliance_rate.unwrap_or(0.0)
            ),
            details: InsightDetails::TimeBucket(bucket.clone()),
            action: None,
        });
    }
}
