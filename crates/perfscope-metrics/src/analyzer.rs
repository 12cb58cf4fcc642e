//! Stateless statistics over metric lists.
//!
//! Degenerate input never fails: an empty list yields a zeroed summary,
//! near-zero variance yields no anomalies, and fewer than two points yield a
//! stable trend.

use crate::metric::Metric;
use perfscope_core::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Below this standard deviation a baseline is too flat to judge outliers.
const MIN_STD_DEV: f64 = 1e-4;

/// Slope deadband, in units per second, for calling a trend flat.
const TREND_DEADBAND: f64 = 0.001;

pub const DEFAULT_SENSITIVITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub count: usize,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
    pub median_value: f64,
    pub p95_value: f64,
    pub p99_value: f64,
    pub std_dev: f64,
}

impl AnalysisSummary {
    fn from_values(values: &[f64]) -> Self {
        let dist = stats::Distribution::from_values(values);
        Self {
            count: dist.count,
            min_value: dist.min,
            max_value: dist.max,
            avg_value: dist.mean,
            median_value: dist.median,
            p95_value: dist.p95,
            p99_value: dist.p99,
            std_dev: dist.std_dev,
        }
    }
}

/// Mean of the analyzed set relative to a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub diff: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions<'a> {
    /// Tag keys to partition by. Metrics missing any key are left out of
    /// the groups.
    pub group_by: Vec<String>,
    pub compare_with: Option<&'a [Metric]>,
}

impl<'a> AnalyzeOptions<'a> {
    pub fn group_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn compare_with(mut self, baseline: &'a [Metric]) -> Self {
        self.compare_with = Some(baseline);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn classify(z_score: f64, threshold: f64) -> Self {
        if z_score >= threshold * 3.0 {
            Self::Critical
        } else if z_score >= threshold * 2.0 {
            Self::High
        } else if z_score >= threshold * 1.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub metric: Metric,
    pub value: f64,
    pub expected: f64,
    pub z_score: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyOptions<'a> {
    /// Defaults to the analyzed set itself.
    pub baseline: Option<&'a [Metric]>,
    /// In `[0, 1]`; higher flags smaller deviations.
    pub sensitivity: f64,
}

impl Default for AnomalyOptions<'_> {
    fn default() -> Self {
        Self {
            baseline: None,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

impl<'a> AnomalyOptions<'a> {
    pub fn baseline(mut self, baseline: &'a [Metric]) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Z-score above which a value is anomalous.
    pub fn threshold(&self) -> f64 {
        let sensitivity = if self.sensitivity.is_finite() {
            self.sensitivity.clamp(0.0, 1.0)
        } else {
            DEFAULT_SENSITIVITY
        };
        3.0 * (1.0 - sensitivity) + 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// Units per second.
    pub slope: f64,
    pub intercept: f64,
    pub direction: TrendDirection,
    /// R² of the fitted line.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forecast: Vec<ForecastPoint>,
}

impl Trend {
    fn stable(intercept: f64) -> Self {
        Self {
            slope: 0.0,
            intercept,
            direction: TrendDirection::Stable,
            confidence: 0.0,
            forecast: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendOptions {
    pub forecast_periods: usize,
}

/// Entry point for metric analysis.
pub struct MetricAnalyzer;

impl MetricAnalyzer {
    pub fn analyze(metrics: &[Metric], options: &AnalyzeOptions<'_>) -> AnalysisResult {
        let values = numbers(metrics);
        let summary = AnalysisSummary::from_values(&values);

        let groups = if options.group_by.is_empty() {
            BTreeMap::new()
        } else {
            let mut partitions: BTreeMap<String, Vec<Metric>> = BTreeMap::new();
            for metric in metrics {
                if let Some(key) = group_key(metric, &options.group_by) {
                    partitions.entry(key).or_default().push(metric.clone());
                }
            }
            partitions
                .into_iter()
                .map(|(key, members)| (key, Self::analyze(&members, &AnalyzeOptions::default())))
                .collect()
        };

        let comparison = options.compare_with.map(|baseline| {
            let baseline_mean = stats::mean(&numbers(baseline));
            let diff = summary.avg_value - baseline_mean;
            let percentage = if baseline_mean == 0.0 {
                0.0
            } else {
                diff / baseline_mean * 100.0
            };
            Comparison { diff, percentage }
        });

        AnalysisResult {
            summary,
            groups,
            comparison,
        }
    }

    pub fn detect_anomalies(metrics: &[Metric], options: &AnomalyOptions<'_>) -> Vec<Anomaly> {
        let baseline = numbers(options.baseline.unwrap_or(metrics));
        let mean = stats::mean(&baseline);
        let std_dev = stats::std_dev(&baseline);
        if baseline.is_empty() || std_dev < MIN_STD_DEV {
            return Vec::new();
        }

        let threshold = options.threshold();
        metrics
            .iter()
            .filter_map(|metric| {
                let value = metric.number()?;
                let z_score = (value - mean).abs() / std_dev;
                (z_score > threshold).then(|| Anomaly {
                    metric: metric.clone(),
                    value,
                    expected: mean,
                    z_score,
                    severity: Severity::classify(z_score, threshold),
                })
            })
            .collect()
    }

    /// Ordinary least squares over `(seconds since first sample, value)`.
    pub fn calculate_trend(metrics: &[Metric], options: &TrendOptions) -> Trend {
        let mut points: Vec<(i64, f64)> = metrics
            .iter()
            .filter_map(|m| m.number().map(|v| (m.timestamp, v)))
            .collect();
        points.sort_by_key(|(timestamp, _)| *timestamp);

        let Some(&(origin, first_value)) = points.first() else {
            return Trend::stable(0.0);
        };
        if points.len() < 2 {
            return Trend::stable(first_value);
        }

        let n = points.len() as f64;
        let xs: Vec<f64> = points
            .iter()
            .map(|(t, _)| (t - origin) as f64 / 1000.0)
            .collect();
        let ys: Vec<f64> = points.iter().map(|(_, v)| *v).collect();

        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator.abs() < f64::EPSILON {
            return Trend::stable(sum_y / n);
        }

        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;

        let mean_y = sum_y / n;
        let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
        let ss_res: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        let confidence = if ss_tot == 0.0 {
            0.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        let direction = if slope > TREND_DEADBAND {
            TrendDirection::Up
        } else if slope < -TREND_DEADBAND {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        let last_x = xs.last().copied().unwrap_or(0.0);
        let spacing = last_x / (n - 1.0);
        let forecast = (1..=options.forecast_periods)
            .map(|step| {
                let x = last_x + spacing * step as f64;
                ForecastPoint {
                    timestamp: origin + (x * 1000.0).round() as i64,
                    value: intercept + slope * x,
                }
            })
            .collect();

        Trend {
            slope,
            intercept,
            direction,
            confidence,
            forecast,
        }
    }
}

fn numbers(metrics: &[Metric]) -> Vec<f64> {
    metrics.iter().filter_map(Metric::number).collect()
}

fn group_key(metric: &Metric, keys: &[String]) -> Option<String> {
    let parts: Option<Vec<String>> = keys
        .iter()
        .map(|key| metric.tags.get(key).map(|value| format!("{key}:{value}")))
        .collect();
    parts.map(|parts| parts.join(","))
}
