//! Descriptive statistics over `f64` samples.
//!
//! Percentiles use linear interpolation between the two nearest ranks at
//! position `p * (n - 1)`. Every function returns 0 for an empty input.

use serde::{Deserialize, Serialize};

/// Interpolated percentile over an already sorted slice. `p` is in `[0, 1]`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let weight = rank - lower as f64;
                // Rounding must not carry the result past the upper rank.
                (sorted[lower] + (sorted[upper] - sorted[lower]) * weight).min(sorted[upper])
            }
        }
    }
}

/// Sort a copy of `values` and return the interpolated percentile.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted_copy(values), p)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Summary of a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Distribution {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self::from_sorted(&sorted_copy(values))
    }

    pub fn from_sorted(sorted: &[f64]) -> Self {
        let Some((&min, &max)) = sorted.first().zip(sorted.last()) else {
            return Self::default();
        };

        Self {
            count: sorted.len(),
            min,
            max,
            mean: mean(sorted),
            median: percentile_sorted(sorted, 0.5),
            std_dev: std_dev(sorted),
            p95: percentile_sorted(sorted, 0.95),
            p99: percentile_sorted(sorted, 0.99),
        }
    }
}
