//! Descriptive statistics over a numeric sample.
//!
//! Everything here is pure and recomputed per call; samples change with
//! every grouping, so caching a summary would only invite stale reads.

use serde::{Deserialize, Serialize};

/// Summary statistics for one numeric sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
}

/// Sort a sample ascending without touching the caller's slice.
/// Stable, so duplicate values keep their relative order.
fn sorted(sample: &[f64]) -> Vec<f64> {
    let mut values = sample.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Compute the full summary for a sample. Returns `None` on an empty sample.
///
/// Median averages the two central values for even counts. Quartiles use the
/// nearest-rank positions `sorted[floor(n*0.25)]` and `sorted[floor(n*0.75)]`
/// so results are bit-for-bit reproducible across runs. Variance is the
/// population variance (divide by n).
pub fn summarize(sample: &[f64]) -> Option<SampleSummary> {
    if sample.is_empty() {
        return None;
    }

    let values = sorted(sample);
    let n = values.len();

    let mean = values.iter().sum::<f64>() / n as f64;

    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();

    let q1 = values[(n as f64 * 0.25).floor() as usize];
    let q3 = values[(n as f64 * 0.75).floor() as usize];

    Some(SampleSummary {
        count: n,
        mean,
        median,
        std_dev,
        variance,
        min: values[0],
        max: values[n - 1],
        q1,
        q3,
        iqr: q3 - q1,
    })
}

/// Nearest-rank percentile: rank `ceil(p/100 * n) - 1`, clamped to >= 0,
/// over the ascending-sorted sample. Returns `None` on an empty sample.
///
/// Note: `percentile(sample, 50.0)` matches `summarize(sample).median` only
/// for odd-length samples; the median averages the two central values on
/// even lengths while nearest-rank picks one. Both behaviors are intended.
pub fn percentile(sample: &[f64], p: f64) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }

    let values = sorted(sample);
    let rank = ((p / 100.0 * values.len() as f64).ceil() as isize - 1).max(0) as usize;
    Some(values[rank.min(values.len() - 1)])
}
