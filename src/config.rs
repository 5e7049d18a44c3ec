//! Threshold configuration -- every tunable constant the detectors use.
//!
//! All severity thresholds live here as named fields so they can be tuned
//! without touching detection logic. `EngineConfig::default()` carries the
//! authoritative values; an optional TOML file can override any of them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Compliance targets for one dispatch leg pair.
///
/// A dispatch is compliant when the crew is on the way within
/// `response_time_secs` of the alarm AND on scene within `travel_time_secs`
/// of leaving the station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub response_time_secs: f64,
    pub travel_time_secs: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            response_time_secs: 90.0,
            travel_time_secs: 480.0,
        }
    }
}

/// Thresholds for the three anomaly models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// |z| above this is an anomaly.
    pub zscore_warning: f64,
    /// |z| above this is critical.
    pub zscore_critical: f64,
    /// Minimum reference sample size for the z-score model.
    pub zscore_min_samples: usize,
    /// Fence factor: Q1 - k*IQR .. Q3 + k*IQR.
    pub iqr_fence_factor: f64,
    /// Extreme fence factor; outside this is critical.
    pub iqr_extreme_factor: f64,
    /// Minimum reference sample size for quartiles.
    pub iqr_min_samples: usize,
    /// Relative deviation from the moving average that is a warning.
    pub moving_avg_warning: f64,
    /// Relative deviation that is critical.
    pub moving_avg_critical: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            zscore_warning: 2.0,
            zscore_critical: 3.0,
            zscore_min_samples: 3,
            iqr_fence_factor: 1.5,
            iqr_extreme_factor: 3.0,
            iqr_min_samples: 4,
            moving_avg_warning: 0.15,
            moving_avg_critical: 0.25,
        }
    }
}

/// Thresholds for run, trend, degradation, and sector pattern detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Minimum run length before a consecutive-event sequence is reported.
    pub run_min_length: usize,
    /// Run length at which a sequence becomes critical.
    pub run_critical_length: usize,
    /// Slope magnitude above which a trend counts as moving.
    pub trend_slope_threshold: f64,
    /// R-squared above which a fit is significant (and at least moderate).
    pub trend_significance: f64,
    /// R-squared above which a fit is strong.
    pub trend_strong: f64,
    /// Relative worsening of a time metric that counts as degradation.
    pub degradation_warning: f64,
    /// Relative worsening that is critical.
    pub degradation_critical: f64,
    /// Compliance-rate drop (percentage points) that counts as degradation.
    pub degradation_rate_warning: f64,
    /// Compliance-rate drop that is critical.
    pub degradation_rate_critical: f64,
    /// "Current" window for the degradation check, in hours.
    pub degradation_current_hours: i64,
    /// Baseline window preceding the current one, in hours.
    pub degradation_baseline_hours: i64,
    /// Sectors with fewer observations than this are not judged.
    pub sector_min_count: usize,
    /// Mean travel time above global mean * this factor flags a sector.
    pub sector_travel_factor: f64,
    /// Compliance rate this many points below global flags a sector.
    pub sector_rate_gap: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            run_min_length: 3,
            run_critical_length: 5,
            trend_slope_threshold: 0.5,
            trend_significance: 0.6,
            trend_strong: 0.8,
            degradation_warning: 0.15,
            degradation_critical: 0.25,
            degradation_rate_warning: 10.0,
            degradation_rate_critical: 20.0,
            degradation_current_hours: 24,
            degradation_baseline_hours: 168,
            sector_min_count: 5,
            sector_travel_factor: 1.2,
            sector_rate_gap: 10.0,
        }
    }
}

/// Aggregator-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Bound on the final insight list.
    pub max_insights: usize,
    /// Compliance-rate gap (points below baseline) that is a warning.
    pub rate_gap_warning: f64,
    /// Compliance-rate gap that is critical.
    pub rate_gap_critical: f64,
    /// How many problem sectors to surface.
    pub top_problem_sectors: usize,
    /// Minimum observations before an hour bucket is judged.
    pub worst_hour_min_count: usize,
    /// Hour buckets with compliance below this rate produce an info insight.
    pub worst_hour_rate_bound: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            max_insights: 10,
            rate_gap_warning: 10.0,
            rate_gap_critical: 20.0,
            top_problem_sectors: 3,
            worst_hour_min_count: 5,
            worst_hour_rate_bound: 75.0,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub compliance: ComplianceConfig,
    pub anomaly: AnomalyConfig,
    pub pattern: PatternConfig,
    pub insights: InsightConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist. A present-but-invalid file is an error: silently
    /// running with defaults against an operator's explicit config would
    /// misreport compliance.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found. Using built-in defaults.");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
