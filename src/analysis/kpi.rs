//! Batch-level compliance KPIs.
//!
//! One report per batch: counts, per-leg success quotas against the
//! configured targets, means, and 90th percentiles. Only compliance-relevant
//! records (no "-NF" event type) enter the leg and compliance figures.

use crate::analysis::stats;
use crate::config::ComplianceConfig;
use crate::records::DispatchRecord;
use serde::{Deserialize, Serialize};

/// KPI figures for one dispatch leg (response or travel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegKpi {
    /// Records where this leg was measurable.
    pub valid: usize,
    /// Records at or under the target.
    pub achieved: usize,
    /// achieved / valid, in percent. `None` without a measurable record.
    pub quota: Option<f64>,
    pub mean_secs: Option<f64>,
    pub p90_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiReport {
    pub total: usize,
    pub relevant: usize,
    pub non_relevant: usize,
    pub response: LegKpi,
    pub travel: LegKpi,
    /// Records where the compliance flag is determinable.
    pub compliance_known: usize,
    pub compliance_met: usize,
    pub compliance_quota: Option<f64>,
}

fn leg_kpi(times: &[f64], target_secs: f64) -> LegKpi {
    let achieved = times.iter().filter(|&&t| t <= target_secs).count();
    LegKpi {
        valid: times.len(),
        achieved,
        quota: if times.is_empty() {
            None
        } else {
            Some(achieved as f64 / times.len() as f64 * 100.0)
        },
        mean_secs: stats::summarize(times).map(|s| s.mean),
        p90_secs: stats::percentile(times, 90.0),
    }
}

/// Compute the KPI report for one batch.
pub fn compute(records: &[DispatchRecord], cfg: &ComplianceConfig) -> KpiReport {
    let relevant: Vec<&DispatchRecord> = records.iter().filter(|r| r.frist_relevant).collect();

    let response_times: Vec<f64> = relevant.iter().filter_map(|r| r.response_time).collect();
    let travel_times: Vec<f64> = relevant.iter().filter_map(|r| r.travel_time).collect();

    let known: Vec<bool> = relevant.iter().filter_map(|r| r.compliance_met).collect();
    let met = known.iter().filter(|&&m| m).count();

    KpiReport {
        total: records.len(),
        relevant: relevant.len(),
        non_relevant: records.len() - relevant.len(),
        response: leg_kpi(&response_times, cfg.response_time_secs),
        travel: leg_kpi(&travel_times, cfg.travel_time_secs),
        compliance_known: known.len(),
        compliance_met: met,
        compliance_quota: if known.is_empty() {
            None
        } else {
            Some(met as f64 / known.len() as f64 * 100.0)
        },
    }
}
