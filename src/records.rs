//! Dispatch record model and preprocessing.
//!
//! Raw records carry the timestamps the dispatch system exports; processing
//! derives the two leg durations and the compliance flag from them. A
//! missing timestamp leaves the affected duration as `None`, and compliance
//! stays undeterminable (`None`) until both legs are known -- typically a
//! vehicle that has not yet arrived.

use crate::config::ComplianceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One dispatch record as exported by the data layer, before derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Vehicle radio call sign, e.g. "RTW-5".
    pub call_sign: String,
    /// Geographic coverage sector, if assigned.
    #[serde(default)]
    pub sector: Option<String>,
    /// Dispatch event type; types ending in "-NF" are exempt from the
    /// compliance target (routine transports, relocations).
    #[serde(default)]
    pub event_type: Option<String>,
    /// Alarm raised.
    pub time_alarm: DateTime<Utc>,
    /// Crew reported on the way.
    #[serde(default)]
    pub time_on_the_way: Option<DateTime<Utc>>,
    /// Vehicle arrived on scene.
    #[serde(default)]
    pub time_arrived: Option<DateTime<Utc>>,
}

/// One processed dispatch record -- the unit every detector consumes.
///
/// Immutable once constructed; owned by the batch that produced it and
/// dropped with it on the next refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub call_sign: String,
    pub sector: Option<String>,
    pub event_type: Option<String>,
    pub alarm_at: DateTime<Utc>,
    /// Seconds from alarm to "on the way", if both timestamps are known.
    pub response_time: Option<f64>,
    /// Seconds from "on the way" to arrival, if both timestamps are known.
    pub travel_time: Option<f64>,
    /// Whether the dispatch met the compliance target. `None` means not yet
    /// determinable (a leg is still missing).
    pub compliance_met: Option<bool>,
    /// Whether the record counts toward compliance KPIs at all.
    pub frist_relevant: bool,
}

/// Event types ending in "-NF" do not count toward the compliance target.
/// Unknown or empty types are counted (the conservative reading).
pub fn is_frist_relevant(event_type: Option<&str>) -> bool {
    match event_type {
        Some(t) if !t.is_empty() => !t.ends_with("-NF"),
        _ => true,
    }
}

/// Derive the duration between two timestamps in seconds.
/// Negative pairs (clock skew, swapped fields) are treated as unknown.
fn leg_seconds(from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> Option<f64> {
    let to = to?;
    let secs = (to - from).num_milliseconds() as f64 / 1000.0;
    if secs < 0.0 {
        return None;
    }
    Some(secs)
}

/// Process a raw export batch into dispatch records.
pub fn process(raw: Vec<RawRecord>, cfg: &ComplianceConfig) -> Vec<DispatchRecord> {
    raw.into_iter().map(|r| process_one(r, cfg)).collect()
}

fn process_one(raw: RawRecord, cfg: &ComplianceConfig) -> DispatchRecord {
    let response_time = leg_seconds(raw.time_alarm, raw.time_on_the_way);
    let travel_time = raw
        .time_on_the_way
        .and_then(|otw| leg_seconds(otw, raw.time_arrived));

    let response_ok = response_time.map(|t| t <= cfg.response_time_secs);
    let travel_ok = travel_time.map(|t| t <= cfg.travel_time_secs);

    let compliance_met = match (response_ok, travel_ok) {
        (Some(r), Some(t)) => Some(r && t),
        _ => None,
    };

    DispatchRecord {
        frist_relevant: is_frist_relevant(raw.event_type.as_deref()),
        call_sign: raw.call_sign,
        sector: raw.sector,
        event_type: raw.event_type,
        alarm_at: raw.time_alarm,
        response_time,
        travel_time,
        compliance_met,
    }
}

/// Group a batch per call sign, each vehicle's records sorted by alarm time.
/// The map is ordered so every pass over it is deterministic.
pub fn group_by_vehicle(records: &[DispatchRecord]) -> BTreeMap<String, Vec<&DispatchRecord>> {
    let mut map: BTreeMap<String, Vec<&DispatchRecord>> = BTreeMap::new();
    for rec in records {
        map.entry(rec.call_sign.clone()).or_default().push(rec);
    }
    for group in map.values_mut() {
        group.sort_by_key(|r| r.alarm_at);
    }
    map
}

/// Group a batch per sector, skipping records without one.
pub fn group_by_sector(records: &[DispatchRecord]) -> BTreeMap<String, Vec<&DispatchRecord>> {
    let mut map: BTreeMap<String, Vec<&DispatchRecord>> = BTreeMap::new();
    for rec in records {
        if let Some(sector) = &rec.sector {
            map.entry(sector.clone()).or_default().push(rec);
        }
    }
    map
}

/// Share of records with `compliance_met == Some(true)`, as a percentage of
/// all records in the slice. `None` for an empty slice.
pub fn compliance_rate(records: &[&DispatchRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let met = records
        .iter()
        .filter(|r| r.compliance_met == Some(true))
        .count();
    Some(met as f64 / records.len() as f64 * 100.0)
}
