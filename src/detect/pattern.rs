//! Pattern detection over ordered or grouped dispatch records.
//!
//! Four families: run-length detection of consecutive adverse events,
//! least-squares trend fitting over a time-ordered series, time-of-day /
//! weekday aggregation, and window comparisons (recent vs. baseline
//! degradation, per-sector performance against the batch).

use crate::config::PatternConfig;
use crate::detect::Severity;
use crate::records::{self, DispatchRecord};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A maximal run of consecutive records satisfying an adverse predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub severity: Severity,
    pub records: Vec<DispatchRecord>,
}

/// Scan chronologically ordered records once and emit every run of at least
/// `min_length` consecutive records matching `predicate`. A run that extends
/// to the end of the input is closed and emitted like any other.
pub fn consecutive_events<F>(
    ordered: &[&DispatchRecord],
    predicate: F,
    min_length: usize,
    cfg: &PatternConfig,
) -> Vec<Sequence>
where
    F: Fn(&DispatchRecord) -> bool,
{
    let mut sequences = Vec::new();
    let mut run: Vec<&DispatchRecord> = Vec::new();

    let close_run = |run: &mut Vec<&DispatchRecord>, sequences: &mut Vec<Sequence>| {
        if run.len() >= min_length {
            sequences.push(Sequence {
                count: run.len(),
                started_at: run[0].alarm_at,
                ended_at: run[run.len() - 1].alarm_at,
                severity: if run.len() >= cfg.run_critical_length {
                    Severity::Critical
                } else {
                    Severity::Warning
                },
                records: run.iter().map(|r| (*r).clone()).collect(),
            });
        }
        run.clear();
    };

    for rec in ordered {
        if predicate(rec) {
            run.push(rec);
        } else {
            close_run(&mut run, &mut sequences);
        }
    }
    close_run(&mut run, &mut sequences);

    sequences
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

/// Ordinary least-squares fit over an ordered series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub is_significant: bool,
}

/// Fit `y = m*x + b` over the series with x = 0..n-1. Needs at least three
/// points. A flat series (zero total variance) fits any line trivially, so
/// it is reported as stable with R-squared 0 and not significant.
pub fn detect_trend(values: &[f64], cfg: &PatternConfig) -> Option<TrendResult> {
    let n = values.len();
    if n < 3 {
        return None;
    }

    let nf = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / (nf * sum_xx - sum_x * sum_x);
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let mut ss_total = 0.0;
    let mut ss_residual = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_total += (y - mean_y).powi(2);
        ss_residual += (y - predicted).powi(2);
    }

    let r_squared = if ss_total == 0.0 {
        0.0
    } else {
        1.0 - ss_residual / ss_total
    };

    let direction = if ss_total == 0.0 {
        TrendDirection::Stable
    } else if slope > cfg.trend_slope_threshold {
        TrendDirection::Increasing
    } else if slope < -cfg.trend_slope_threshold {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let strength = if r_squared > cfg.trend_strong {
        TrendStrength::Strong
    } else if r_squared > cfg.trend_significance {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    Some(TrendResult {
        slope,
        intercept,
        r_squared,
        direction,
        strength,
        is_significant: r_squared > cfg.trend_significance,
    })
}

/// How to bucket records for time-pattern aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrouping {
    /// Hour of day, 0-23.
    Hour,
    /// Weekday, 0 = Sunday .. 6 = Saturday.
    Weekday,
}

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Aggregate for one hour-of-day or weekday bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    pub key: u32,
    pub label: String,
    pub count: usize,
    pub mean_response: Option<f64>,
    pub mean_travel: Option<f64>,
    pub compliance_rate: Option<f64>,
}

/// Group the batch by hour-of-day or weekday of the alarm timestamp and
/// compute per-bucket aggregates, sorted ascending by bucket key.
pub fn time_patterns(records: &[DispatchRecord], group_by: TimeGrouping) -> Vec<TimeBucket> {
    let mut groups: BTreeMap<u32, Vec<&DispatchRecord>> = BTreeMap::new();
    for rec in records {
        let key = match group_by {
            TimeGrouping::Hour => rec.alarm_at.hour(),
            TimeGrouping::Weekday => rec.alarm_at.date_naive().weekday().num_days_from_sunday(),
        };
        groups.entry(key).or_default().push(rec);
    }

    groups
        .into_iter()
        .map(|(key, group)| {
            let responses: Vec<f64> = group.iter().filter_map(|r| r.response_time).collect();
            let travels: Vec<f64> = group.iter().filter_map(|r| r.travel_time).collect();
            TimeBucket {
                key,
                label: match group_by {
                    TimeGrouping::Hour => format!("{key:02}:00"),
                    TimeGrouping::Weekday => WEEKDAY_LABELS[key as usize].to_string(),
                },
                count: group.len(),
                mean_response: mean(&responses),
                mean_travel: mean(&travels),
                compliance_rate: records::compliance_rate(&group),
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// KPIs for one comparison window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowKpis {
    pub count: usize,
    pub mean_response: Option<f64>,
    pub mean_travel: Option<f64>,
    pub compliance_rate: Option<f64>,
}

fn window_kpis(window: &[&DispatchRecord]) -> WindowKpis {
    let responses: Vec<f64> = window.iter().filter_map(|r| r.response_time).collect();
    let travels: Vec<f64> = window.iter().filter_map(|r| r.travel_time).collect();
    WindowKpis {
        count: window.len(),
        mean_response: mean(&responses),
        mean_travel: mean(&travels),
        compliance_rate: records::compliance_rate(window),
    }
}

/// Change in one time metric between the windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDelta {
    pub delta: f64,
    pub delta_percent: f64,
    pub is_degrading: bool,
}

/// Change in the compliance rate between the windows, in percentage points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateDelta {
    pub delta_points: f64,
    pub is_degrading: bool,
}

/// Recent-vs-baseline comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationReport {
    pub current: WindowKpis,
    pub baseline: WindowKpis,
    pub response: Option<MetricDelta>,
    pub travel: Option<MetricDelta>,
    pub compliance: Option<RateDelta>,
    pub is_degrading: bool,
    pub severity: Severity,
}

/// Compare the most recent `degradation_current_hours` of the batch against
/// the `degradation_baseline_hours` preceding them (non-overlapping).
///
/// Windows are anchored at the latest alarm timestamp in the batch, not the
/// wall clock, so the result is a pure function of the input. Returns `None`
/// if either window is empty.
pub fn performance_degradation(
    records: &[DispatchRecord],
    cfg: &PatternConfig,
) -> Option<DegradationReport> {
    let anchor = records.iter().map(|r| r.alarm_at).max()?;
    let current_cutoff = anchor - Duration::hours(cfg.degradation_current_hours);
    let baseline_cutoff = anchor - Duration::hours(cfg.degradation_baseline_hours);

    let current: Vec<&DispatchRecord> = records
        .iter()
        .filter(|r| r.alarm_at >= current_cutoff)
        .collect();
    let baseline: Vec<&DispatchRecord> = records
        .iter()
        .filter(|r| r.alarm_at >= baseline_cutoff && r.alarm_at < current_cutoff)
        .collect();

    if current.is_empty() || baseline.is_empty() {
        return None;
    }

    let current_kpis = window_kpis(&current);
    let baseline_kpis = window_kpis(&baseline);

    // Severities of every degrading metric; the report carries the worst.
    let mut flagged: Vec<Severity> = Vec::new();

    let time_delta = |cur: Option<f64>, base: Option<f64>| -> Option<(MetricDelta, Severity)> {
        let (cur, base) = (cur?, base?);
        let delta = cur - base;
        let sev = if delta > base * cfg.degradation_critical {
            Severity::Critical
        } else {
            Severity::Warning
        };
        Some((
            MetricDelta {
                delta,
                delta_percent: delta / base * 100.0,
                is_degrading: delta > base * cfg.degradation_warning,
            },
            sev,
        ))
    };

    let response = time_delta(current_kpis.mean_response, baseline_kpis.mean_response);
    let travel = time_delta(current_kpis.mean_travel, baseline_kpis.mean_travel);
    for (d, sev) in [&response, &travel].into_iter().flatten() {
        if d.is_degrading {
            flagged.push(*sev);
        }
    }

    let compliance = match (current_kpis.compliance_rate, baseline_kpis.compliance_rate) {
        (Some(cur), Some(base)) => {
            let delta = cur - base;
            let degrading = delta < -cfg.degradation_rate_warning;
            if degrading {
                flagged.push(if delta < -cfg.degradation_rate_critical {
                    Severity::Critical
                } else {
                    Severity::Warning
                });
            }
            Some(RateDelta {
                delta_points: delta,
                is_degrading: degrading,
            })
        }
        _ => None,
    };

    let severity = flagged
        .iter()
        .copied()
        .min_by_key(|s| s.rank())
        .unwrap_or(Severity::Normal);

    Some(DegradationReport {
        current: current_kpis,
        baseline: baseline_kpis,
        response: response.map(|(d, _)| d),
        travel: travel.map(|(d, _)| d),
        compliance,
        is_degrading: !flagged.is_empty(),
        severity,
    })
}

/// What pushed a sector over the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorIssue {
    TravelTime,
    ComplianceRate,
}

/// One flagged sector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorReport {
    pub sector: String,
    pub count: usize,
    pub issues: Vec<SectorIssue>,
    pub mean_travel: Option<f64>,
    pub baseline_travel: f64,
    pub compliance_rate: Option<f64>,
    pub baseline_compliance: f64,
    pub severity: Severity,
}

/// Flag sectors whose mean travel time exceeds the batch mean by the
/// configured factor, or whose compliance rate trails the batch rate by the
/// configured gap. Sectors with fewer than `sector_min_count` observations
/// are skipped. Critical when both conditions hold; ranked critical first,
/// then by observation count descending.
pub fn problem_sectors(records: &[DispatchRecord], cfg: &PatternConfig) -> Vec<SectorReport> {
    let all_travels: Vec<f64> = records.iter().filter_map(|r| r.travel_time).collect();
    let baseline_travel = mean(&all_travels).unwrap_or(0.0);

    let all_refs: Vec<&DispatchRecord> = records.iter().collect();
    let baseline_compliance = records::compliance_rate(&all_refs).unwrap_or(0.0);

    let mut reports = Vec::new();
    for (sector, group) in records::group_by_sector(records) {
        if group.len() < cfg.sector_min_count {
            continue;
        }

        let travels: Vec<f64> = group.iter().filter_map(|r| r.travel_time).collect();
        let mean_travel = mean(&travels);
        let rate = records::compliance_rate(&group);

        let mut issues = Vec::new();
        if let Some(t) = mean_travel {
            if baseline_travel > 0.0 && t > baseline_travel * cfg.sector_travel_factor {
                issues.push(SectorIssue::TravelTime);
            }
        }
        if let Some(r) = rate {
            if r < baseline_compliance - cfg.sector_rate_gap {
                issues.push(SectorIssue::ComplianceRate);
            }
        }

        if issues.is_empty() {
            continue;
        }

        reports.push(SectorReport {
            sector,
            count: group.len(),
            severity: if issues.len() >= 2 {
                Severity::Critical
            } else {
                Severity::Warning
            },
            issues,
            mean_travel,
            baseline_travel,
            compliance_rate: rate,
            baseline_compliance,
        });
    }

    // Stable sort: critical first, then larger sectors; ties keep the
    // alphabetical order the grouping produced.
    reports.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then(b.count.cmp(&a.count))
    });
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> PatternConfig {
        PatternConfig::default()
    }

    fn rec_at(hours_ago: i64, call_sign: &str, met: Option<bool>) -> DispatchRecord {
        DispatchRecord {
            call_sign: call_sign.to_string(),
            sector: None,
            event_type: None,
            alarm_at: Utc.timestamp_opt(1_700_000_000 - hours_ago * 3600, 0).unwrap(),
            response_time: Some(60.0),
            travel_time: Some(300.0),
            compliance_met: met,
            frist_relevant: true,
        }
    }

    #[test]
    fn test_consecutive_events_closes_run_at_end_of_input() {
        // fail fail fail ok fail fail fail fail fail
        let flags = [false, false, false, true, false, false, false, false, false];
        let recs: Vec<DispatchRecord> = flags
            .iter()
            .enumerate()
            .map(|(i, &met)| rec_at(-(i as i64), "RTW-3", Some(met)))
            .collect();
        let refs: Vec<&DispatchRecord> = recs.iter().collect();

        let seqs = consecutive_events(&refs, |r| r.compliance_met == Some(false), 3, &cfg());

        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].count, 3);
        assert_eq!(seqs[0].severity, Severity::Warning);
        // The trailing run reaches the end of input and must still be emitted
        assert_eq!(seqs[1].count, 5);
        assert_eq!(seqs[1].severity, Severity::Critical);
        assert_eq!(seqs[1].started_at, recs[4].alarm_at);
        assert_eq!(seqs[1].ended_at, recs[8].alarm_at);
    }

    #[test]
    fn test_consecutive_events_below_min_length() {
        let flags = [false, false, true, false];
        let recs: Vec<DispatchRecord> = flags
            .iter()
            .enumerate()
            .map(|(i, &met)| rec_at(-(i as i64), "RTW-1", Some(met)))
            .collect();
        let refs: Vec<&DispatchRecord> = recs.iter().collect();

        let seqs = consecutive_events(&refs, |r| r.compliance_met == Some(false), 3, &cfg());
        assert!(seqs.is_empty());
    }

    #[test]
    fn test_trend_decreasing_significant() {
        let r = detect_trend(&[82.0, 76.0, 71.0, 68.0], &cfg()).unwrap();
        assert!(r.slope < 0.0);
        assert_eq!(r.direction, TrendDirection::Decreasing);
        assert!(r.is_significant);
        assert_eq!(r.strength, TrendStrength::Strong);
    }

    #[test]
    fn test_trend_flat_series_is_stable() {
        let r = detect_trend(&[50.0, 50.0, 50.0, 50.0], &cfg()).unwrap();
        assert_eq!(r.direction, TrendDirection::Stable);
        assert_eq!(r.r_squared, 0.0);
        assert!(!r.is_significant);
    }

    #[test]
    fn test_trend_small_slope_is_stable() {
        // Rising, but under the 0.5/step threshold
        let r = detect_trend(&[10.0, 10.3, 10.6, 10.9], &cfg()).unwrap();
        assert_eq!(r.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_needs_three_points() {
        assert!(detect_trend(&[1.0, 2.0], &cfg()).is_none());
    }

    #[test]
    fn test_time_patterns_hour_buckets() {
        let mut recs = Vec::new();
        // Three records at 08:xx, two at 14:xx
        for i in 0..3 {
            let mut r = rec_at(0, "RTW-1", Some(true));
            r.alarm_at = Utc.with_ymd_and_hms(2025, 11, 3, 8, 10 + i, 0).unwrap();
            recs.push(r);
        }
        for i in 0..2 {
            let mut r = rec_at(0, "RTW-1", Some(false));
            r.alarm_at = Utc.with_ymd_and_hms(2025, 11, 3, 14, 10 + i, 0).unwrap();
            r.response_time = Some(120.0);
            recs.push(r);
        }

        let buckets = time_patterns(&recs, TimeGrouping::Hour);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, 8);
        assert_eq!(buckets[0].label, "08:00");
        assert_eq!(buckets[0].count, 3);
        assert_eq!(buckets[0].compliance_rate, Some(100.0));
        assert_eq!(buckets[1].key, 14);
        assert_eq!(buckets[1].mean_response, Some(120.0));
        assert_eq!(buckets[1].compliance_rate, Some(0.0));
    }

    #[test]
    fn test_time_patterns_weekday_buckets() {
        // 2025-11-02 is a Sunday, 2025-11-03 a Monday
        let mut sun = rec_at(0, "RTW-1", Some(true));
        sun.alarm_at = Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap();
        let mut mon = rec_at(0, "RTW-1", Some(true));
        mon.alarm_at = Utc.with_ymd_and_hms(2025, 11, 3, 12, 0, 0).unwrap();

        let buckets = time_patterns(&[sun, mon], TimeGrouping::Weekday);
        assert_eq!(buckets[0].key, 0);
        assert_eq!(buckets[0].label, "Sun");
        assert_eq!(buckets[1].key, 1);
        assert_eq!(buckets[1].label, "Mon");
    }

    #[test]
    fn test_degradation_detects_worse_recent_window() {
        let mut recs = Vec::new();
        // Baseline: 30 records spread over days 2-6 back, fast and compliant
        for i in 0..30 {
            let mut r = rec_at(48 + i * 3, "RTW-1", Some(true));
            r.response_time = Some(60.0);
            r.travel_time = Some(300.0);
            recs.push(r);
        }
        // Current 24h: 10 records, much slower and mostly non-compliant
        for i in 0..10 {
            let mut r = rec_at(i, "RTW-1", Some(i % 4 == 0));
            r.response_time = Some(90.0);
            r.travel_time = Some(450.0);
            recs.push(r);
        }

        let report = performance_degradation(&recs, &cfg()).unwrap();
        assert!(report.is_degrading);
        // Response 60 -> 90 is +50%, over the 25% critical bound
        let resp = report.response.unwrap();
        assert!(resp.is_degrading);
        assert!((resp.delta_percent - 50.0).abs() < 1e-9);
        assert_eq!(report.severity, Severity::Critical);
        let compliance = report.compliance.unwrap();
        assert!(compliance.is_degrading);
    }

    #[test]
    fn test_degradation_none_on_empty_window() {
        // All records in the last 24h: baseline window is empty
        let recs: Vec<DispatchRecord> = (0..10).map(|i| rec_at(i, "RTW-1", Some(true))).collect();
        assert!(performance_degradation(&recs, &cfg()).is_none());

        // Empty batch has no anchor at all
        assert!(performance_degradation(&[], &cfg()).is_none());
    }

    #[test]
    fn test_degradation_stable_batch_not_degrading() {
        let mut recs = Vec::new();
        for i in 0..40 {
            recs.push(rec_at(i * 4, "RTW-1", Some(true)));
        }
        let report = performance_degradation(&recs, &cfg()).unwrap();
        assert!(!report.is_degrading);
        assert_eq!(report.severity, Severity::Normal);
    }

    fn sector_rec(sector: &str, travel: f64, met: bool) -> DispatchRecord {
        let mut r = rec_at(0, "RTW-1", Some(met));
        r.sector = Some(sector.to_string());
        r.travel_time = Some(travel);
        r
    }

    #[test]
    fn test_problem_sectors_ranking_and_min_count() {
        let mut recs = Vec::new();
        // Healthy bulk: 20 records, travel 300s, compliant
        for _ in 0..20 {
            recs.push(sector_rec("Mitte", 300.0, true));
        }
        // "Altona": slow AND non-compliant -> critical
        for _ in 0..6 {
            recs.push(sector_rec("Altona", 700.0, false));
        }
        // "Nord": only slow -> warning
        for _ in 0..8 {
            recs.push(sector_rec("Nord", 650.0, true));
        }
        // "Ost": bad but only 3 records -> excluded
        for _ in 0..3 {
            recs.push(sector_rec("Ost", 900.0, false));
        }

        let reports = problem_sectors(&recs, &cfg());
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].sector, "Altona");
        assert_eq!(reports[0].severity, Severity::Critical);
        assert_eq!(
            reports[0].issues,
            vec![SectorIssue::TravelTime, SectorIssue::ComplianceRate]
        );

        assert_eq!(reports[1].sector, "Nord");
        assert_eq!(reports[1].severity, Severity::Warning);
    }

    #[test]
    fn test_problem_sectors_empty_without_sectors() {
        let recs: Vec<DispatchRecord> = (0..10).map(|i| rec_at(i, "RTW-1", Some(true))).collect();
        assert!(problem_sectors(&recs, &cfg()).is_empty());
    }
}
