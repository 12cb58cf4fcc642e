//! Benchmark results.

use crate::config::{BenchmarkConfig, StatKey};
use crate::error::ExecutionError;
use perfscope_core::{Distribution, HostSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-iteration wall time in milliseconds.
pub const DURATION_METRIC: &str = "duration";
/// Process CPU usage samples.
pub const CPU_METRIC: &str = "cpu_usage_percent";
/// Process resident memory samples.
pub const MEMORY_METRIC: &str = "memory_rss_mb";
/// Sampler tick lateness, a proxy for scheduler stalls.
pub const EVENT_LOOP_METRIC: &str = "event_loop_delay_ms";

/// Statistics over one measured series, plus the raw values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
    pub values: Vec<f64>,
}

impl MetricStats {
    pub fn from_values(values: Vec<f64>) -> Self {
        let dist = Distribution::from_values(&values);
        Self {
            min: dist.min,
            max: dist.max,
            mean: dist.mean,
            median: dist.median,
            std_dev: dist.std_dev,
            p95: dist.p95,
            p99: dist.p99,
            values,
        }
    }

    pub fn get(&self, stat: StatKey) -> f64 {
        match stat {
            StatKey::Min => self.min,
            StatKey::Max => self.max,
            StatKey::Mean => self.mean,
            StatKey::Median => self.median,
            StatKey::StdDev => self.std_dev,
            StatKey::P95 => self.p95,
            StatKey::P99 => self.p99,
        }
    }
}

/// Outcome of checking one statistic against its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdCheck {
    pub stat: StatKey,
    pub limit: f64,
    /// `None` when the metric was never measured.
    pub actual: Option<f64>,
    pub passed: bool,
    /// Human readable form, e.g. `p95: 4.20 <= 5.00`.
    pub comparison: String,
}

impl ThresholdCheck {
    pub fn evaluate(stat: StatKey, limit: f64, stats: Option<&MetricStats>) -> Self {
        let op = if stat.is_lower_bound() { ">=" } else { "<=" };
        match stats.map(|s| s.get(stat)) {
            Some(actual) => {
                let passed = if stat.is_lower_bound() {
                    actual >= limit
                } else {
                    actual <= limit
                };
                Self {
                    stat,
                    limit,
                    actual: Some(actual),
                    passed,
                    comparison: format!("{stat}: {actual:.2} {op} {limit:.2}"),
                }
            }
            None => Self {
                stat,
                limit,
                actual: None,
                passed: false,
                comparison: format!("{stat}: not measured ({op} {limit:.2})"),
            },
        }
    }
}

/// Checks grouped by metric name.
pub type ThresholdValidation = BTreeMap<String, Vec<ThresholdCheck>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkContext {
    pub environment: HostSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub run_id: Uuid,
    pub config: BenchmarkConfig,
    pub context: BenchmarkContext,
    pub passed: bool,
    /// Wall time of the measured phase.
    pub duration_ms: f64,
    /// Iterations that completed.
    pub iterations: u32,
    pub operations: u64,
    pub ops_per_second: f64,
    pub metrics: BTreeMap<String, MetricStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_validation: Option<ThresholdValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Unix epoch milliseconds at the start of the run.
    pub timestamp_ms: i64,
}

impl BenchmarkResult {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn duration_stats(&self) -> Option<&MetricStats> {
        self.metrics.get(DURATION_METRIC)
    }

    /// Every failed threshold check, paired with its metric name.
    pub fn failed_checks(&self) -> impl Iterator<Item = (&str, &ThresholdCheck)> {
        self.threshold_validation
            .iter()
            .flat_map(|validation| validation.iter())
            .flat_map(|(metric, checks)| checks.iter().map(move |check| (metric.as_str(), check)))
            .filter(|(_, check)| !check.passed)
    }

    pub fn thresholds_passed(&self) -> bool {
        self.failed_checks().next().is_none()
    }
}

/// Evaluate every configured threshold against the measured metrics.
pub fn validate_thresholds(
    config: &BenchmarkConfig,
    metrics: &BTreeMap<String, MetricStats>,
) -> Option<ThresholdValidation> {
    if config.thresholds.is_empty() {
        return None;
    }

    Some(
        config
            .thresholds
            .iter()
            .map(|(metric, limits)| {
                let stats = metrics.get(metric);
                let checks = limits
                    .iter()
                    .map(|(stat, limit)| ThresholdCheck::evaluate(*stat, *limit, stats))
                    .collect();
                (metric.clone(), checks)
            })
            .collect(),
    )
}
