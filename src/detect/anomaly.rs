//! Classify a single value against a reference sample.
//!
//! Three interchangeable models: z-score (assumes roughly normal spread),
//! IQR fences (robust against extreme values), and moving-average deviation
//! (trend-relative). Each returns `None` when the reference sample is too
//! small or has no usable spread -- insufficient data is not an error.

use crate::analysis::stats;
use crate::config::AnomalyConfig;
use crate::detect::{Direction, Severity};
use serde::{Deserialize, Serialize};

/// Z-score classification of one value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreResult {
    pub z_score: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub is_anomaly: bool,
    pub severity: Severity,
    pub direction: Direction,
    /// Deviation from the reference mean, in percent of the mean.
    pub percentage: f64,
}

/// IQR-fence classification of one value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IqrResult {
    pub is_anomaly: bool,
    pub severity: Severity,
    /// `None` while the value sits inside the fences.
    pub direction: Option<Direction>,
    /// The fence that was crossed, if any.
    pub fence: Option<f64>,
    /// Distance past the crossed fence, 0 inside the fences.
    pub distance: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

/// Moving-average deviation of the latest value against its own history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovingAverageResult {
    pub current: f64,
    pub moving_avg: f64,
    pub delta: f64,
    pub delta_percent: f64,
    pub direction: Direction,
    pub is_anomaly: bool,
    pub severity: Severity,
    pub window_size: usize,
}

/// Z-score model: how many standard deviations `value` sits from the
/// reference mean. Needs at least `cfg.zscore_min_samples` reference values
/// and a non-zero standard deviation -- with all reference values identical
/// no meaningful deviation is definable.
pub fn detect_zscore(value: f64, reference: &[f64], cfg: &AnomalyConfig) -> Option<ZScoreResult> {
    if reference.len() < cfg.zscore_min_samples {
        return None;
    }

    let summary = stats::summarize(reference)?;
    if summary.std_dev == 0.0 {
        return None;
    }

    let z_score = (value - summary.mean) / summary.std_dev;
    let abs_z = z_score.abs();

    let severity = if abs_z > cfg.zscore_critical {
        Severity::Critical
    } else if abs_z > cfg.zscore_warning {
        Severity::Warning
    } else {
        Severity::Normal
    };

    Some(ZScoreResult {
        z_score,
        mean: summary.mean,
        std_dev: summary.std_dev,
        is_anomaly: abs_z > cfg.zscore_warning,
        severity,
        direction: if z_score > 0.0 {
            Direction::Above
        } else {
            Direction::Below
        },
        percentage: (value - summary.mean) / summary.mean * 100.0,
    })
}

/// IQR-fence model. Fences sit at Q1/Q3 +/- `iqr_fence_factor` * IQR, the
/// extreme fences at `iqr_extreme_factor` * IQR. Needs at least
/// `cfg.iqr_min_samples` values and a non-zero IQR.
pub fn detect_iqr(value: f64, reference: &[f64], cfg: &AnomalyConfig) -> Option<IqrResult> {
    if reference.len() < cfg.iqr_min_samples {
        return None;
    }

    let summary = stats::summarize(reference)?;
    if summary.iqr == 0.0 {
        return None;
    }

    let lower_fence = summary.q1 - cfg.iqr_fence_factor * summary.iqr;
    let upper_fence = summary.q3 + cfg.iqr_fence_factor * summary.iqr;
    let extreme_lower = summary.q1 - cfg.iqr_extreme_factor * summary.iqr;
    let extreme_upper = summary.q3 + cfg.iqr_extreme_factor * summary.iqr;

    let mut result = IqrResult {
        is_anomaly: false,
        severity: Severity::Normal,
        direction: None,
        fence: None,
        distance: 0.0,
        q1: summary.q1,
        q3: summary.q3,
        iqr: summary.iqr,
        lower_fence,
        upper_fence,
    };

    if value < lower_fence {
        result.is_anomaly = true;
        result.direction = Some(Direction::Below);
        result.fence = Some(lower_fence);
        result.distance = lower_fence - value;
        result.severity = if value < extreme_lower {
            Severity::Critical
        } else {
            Severity::Warning
        };
    } else if value > upper_fence {
        result.is_anomaly = true;
        result.direction = Some(Direction::Above);
        result.fence = Some(upper_fence);
        result.distance = value - upper_fence;
        result.severity = if value > extreme_upper {
            Severity::Critical
        } else {
            Severity::Warning
        };
    }

    Some(result)
}

/// Moving-average model: relative deviation of `current` from the mean of
/// the last `window_size` values of a chronological series. Needs at least
/// `window_size` historical values.
pub fn detect_moving_average(
    current: f64,
    history: &[f64],
    window_size: usize,
    cfg: &AnomalyConfig,
) -> Option<MovingAverageResult> {
    if window_size == 0 || history.len() < window_size {
        return None;
    }

    let window = &history[history.len() - window_size..];
    let moving_avg = window.iter().sum::<f64>() / window_size as f64;

    let delta = current - moving_avg;
    let deviation = (delta / moving_avg).abs();

    let severity = if deviation > cfg.moving_avg_critical {
        Severity::Critical
    } else if deviation > cfg.moving_avg_warning {
        Severity::Warning
    } else {
        Severity::Normal
    };

    Some(MovingAverageResult {
        current,
        moving_avg,
        delta,
        delta_percent: delta / moving_avg * 100.0,
        direction: if delta > 0.0 {
            Direction::Above
        } else {
            Direction::Below
        },
        is_anomaly: deviation > cfg.moving_avg_warning,
        severity,
        window_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AnomalyConfig {
        AnomalyConfig::default()
    }

    #[test]
    fn test_zscore_literal_fixture() {
        // mean = 72.5, population std dev ~ 14.36
        let reference = [50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0, 85.0, 90.0, 95.0];
        let r = detect_zscore(110.0, &reference, &cfg()).unwrap();

        assert!((r.z_score - 2.61).abs() < 0.01);
        assert!(r.is_anomaly);
        assert_eq!(r.severity, Severity::Warning);
        assert_eq!(r.direction, Direction::Above);
        assert!((r.percentage - 51.72).abs() < 0.01);
    }

    #[test]
    fn test_zscore_critical_above_three_sigma() {
        let reference = [50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0, 85.0, 90.0, 95.0];
        let r = detect_zscore(120.0, &reference, &cfg()).unwrap();
        assert!(r.z_score > 3.0);
        assert_eq!(r.severity, Severity::Critical);
    }

    #[test]
    fn test_zscore_needs_three_samples() {
        assert!(detect_zscore(10.0, &[1.0, 2.0], &cfg()).is_none());
        assert!(detect_zscore(10.0, &[], &cfg()).is_none());
    }

    #[test]
    fn test_zscore_constant_reference_is_undefined() {
        // All identical: std dev 0, no meaningful deviation definable
        assert!(detect_zscore(10.0, &[5.0, 5.0, 5.0, 5.0], &cfg()).is_none());
    }

    #[test]
    fn test_zscore_normal_value() {
        let reference = [50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0, 85.0, 90.0, 95.0];
        let r = detect_zscore(75.0, &reference, &cfg()).unwrap();
        assert!(!r.is_anomaly);
        assert_eq!(r.severity, Severity::Normal);
    }

    #[test]
    fn test_iqr_literal_fixture() {
        // Q1 = 30, Q3 = 80, IQR = 50: fences at -45/155, extremes at -120/230
        let reference = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0];

        let r = detect_iqr(200.0, &reference, &cfg()).unwrap();
        assert_eq!(r.upper_fence, 155.0);
        assert!(r.is_anomaly);
        // 200 crosses the 155 fence but not the 230 extreme fence
        assert_eq!(r.severity, Severity::Warning);
        assert_eq!(r.direction, Some(Direction::Above));
        assert_eq!(r.distance, 45.0);

        let extreme = detect_iqr(250.0, &reference, &cfg()).unwrap();
        assert_eq!(extreme.severity, Severity::Critical);

        let low = detect_iqr(-100.0, &reference, &cfg()).unwrap();
        assert!(low.is_anomaly);
        assert_eq!(low.direction, Some(Direction::Below));

        let inside = detect_iqr(55.0, &reference, &cfg()).unwrap();
        assert!(!inside.is_anomaly);
        assert_eq!(inside.severity, Severity::Normal);
        assert_eq!(inside.fence, None);
    }

    #[test]
    fn test_iqr_guards() {
        // Fewer than four samples
        assert!(detect_iqr(10.0, &[1.0, 2.0, 3.0], &cfg()).is_none());
        // Zero IQR: middle of the sample is flat
        assert!(detect_iqr(10.0, &[5.0, 5.0, 5.0, 5.0, 5.0, 5.0], &cfg()).is_none());
    }

    #[test]
    fn test_moving_average_deviation() {
        let history = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0];

        // 10% over: normal
        let r = detect_moving_average(110.0, &history, 7, &cfg()).unwrap();
        assert!(!r.is_anomaly);
        assert_eq!(r.severity, Severity::Normal);

        // 20% over: warning
        let r = detect_moving_average(120.0, &history, 7, &cfg()).unwrap();
        assert!(r.is_anomaly);
        assert_eq!(r.severity, Severity::Warning);
        assert_eq!(r.direction, Direction::Above);

        // 30% under: critical, below
        let r = detect_moving_average(70.0, &history, 7, &cfg()).unwrap();
        assert_eq!(r.severity, Severity::Critical);
        assert_eq!(r.direction, Direction::Below);
    }

    #[test]
    fn test_moving_average_uses_last_window() {
        // Only the last 3 values (all 200) should enter the average
        let history = [10.0, 10.0, 10.0, 200.0, 200.0, 200.0];
        let r = detect_moving_average(200.0, &history, 3, &cfg()).unwrap();
        assert_eq!(r.moving_avg, 200.0);
        assert!(!r.is_anomaly);
    }

    #[test]
    fn test_moving_average_needs_full_window() {
        assert!(detect_moving_average(1.0, &[1.0, 2.0], 3, &cfg()).is_none());
        assert!(detect_moving_average(1.0, &[1.0], 0, &cfg()).is_none());
    }
}
