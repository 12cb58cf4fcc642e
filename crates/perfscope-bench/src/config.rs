//! Benchmark case configuration.

use perfscope_core::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkType {
    Throughput,
    Latency,
    Load,
    Stress,
    Endurance,
    Memory,
    Custom,
}

impl fmt::Display for BenchmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Throughput => "throughput",
            Self::Latency => "latency",
            Self::Load => "load",
            Self::Stress => "stress",
            Self::Endurance => "endurance",
            Self::Memory => "memory",
            Self::Custom => "custom",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkLevel {
    Unit,
    Component,
    Integration,
    System,
}

impl fmt::Display for BenchmarkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unit => "unit",
            Self::Component => "component",
            Self::Integration => "integration",
            Self::System => "system",
        })
    }
}

/// Statistic a threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatKey {
    Min,
    Max,
    Mean,
    Median,
    StdDev,
    P95,
    P99,
}

impl StatKey {
    /// `min` is a floor; every other statistic is a ceiling.
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, Self::Min)
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::StdDev => "stdDev",
            Self::P95 => "p95",
            Self::P99 => "p99",
        })
    }
}

/// `metric name -> statistic -> limit`.
pub type Thresholds = BTreeMap<String, BTreeMap<StatKey, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkConfig {
    /// Unique within a runner.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BenchmarkType,
    pub level: BenchmarkLevel,
    pub iterations: u32,
    pub warmup_runs: u32,
    /// Iterations allowed in flight at once.
    pub concurrency: u32,
    /// No iteration starts once this budget has elapsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl BenchmarkConfig {
    pub fn new(name: impl Into<String>, kind: BenchmarkType, level: BenchmarkLevel) -> Self {
        Self {
            name: name.into(),
            kind,
            level,
            iterations: 100,
            warmup_runs: 5,
            concurrency: 1,
            timeout_ms: None,
            thresholds: Thresholds::new(),
            description: None,
            tags: Vec::new(),
        }
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn warmup_runs(mut self, warmup_runs: u32) -> Self {
        self.warmup_runs = warmup_runs;
        self
    }

    pub fn concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn threshold(mut self, metric: impl Into<String>, stat: StatKey, limit: f64) -> Self {
        self.thresholds
            .entry(metric.into())
            .or_default()
            .insert(stat, limit);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::empty("benchmark name"));
        }
        if self.iterations == 0 {
            return Err(ValidationError::below_minimum("iterations", 1, 0));
        }
        if self.concurrency == 0 {
            return Err(ValidationError::below_minimum("concurrency", 1, 0));
        }
        if self.timeout_ms == Some(0) {
            return Err(ValidationError::below_minimum("timeout_ms", 1, 0));
        }
        for (metric, limits) in &self.thresholds {
            if metric.trim().is_empty() {
                return Err(ValidationError::empty("threshold metric name"));
            }
            for (stat, limit) in limits {
                ValidationError::check_finite(&format!("threshold {metric}.{stat}"), *limit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BenchmarkConfig {
        BenchmarkConfig::new("parse", BenchmarkType::Latency, BenchmarkLevel::Unit)
    }

    #[test]
    fn test_builder_and_json_shape() {
        let config = config()
            .iterations(20)
            .warmup_runs(2)
            .threshold("duration", StatKey::P95, 5.0)
            .threshold("duration", StatKey::StdDev, 1.0)
            .tag("parser");

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "latency");
        assert_eq!(json["warmupRuns"], 2);
        assert_eq!(json["thresholds"]["duration"]["p95"], 5.0);
        assert_eq!(json["thresholds"]["duration"]["stdDev"], 1.0);

        let back: BenchmarkConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());
        assert!(matches!(
            BenchmarkConfig::new(" ", BenchmarkType::Load, BenchmarkLevel::System).validate(),
            Err(ValidationError::Empty { .. })
        ));
        assert!(matches!(
            config().iterations(0).validate(),
            Err(ValidationError::BelowMinimum { .. })
        ));
        assert!(config().concurrency(0).validate().is_err());
        assert!(config().timeout_ms(0).validate().is_err());
        assert!(matches!(
            config().threshold("duration", StatKey::Max, f64::NAN).validate(),
            Err(ValidationError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_only_min_is_lower_bound() {
        assert!(StatKey::Min.is_lower_bound());
        assert!(!StatKey::Max.is_lower_bound());
        assert!(!StatKey::P99.is_lower_bound());
    }
}
