//! Engine configuration.
//!
//! Loaded from a `.toml` or `.json` file, then adjusted with `PERFSCOPE_*`
//! overrides. Durations are written as humantime strings such as `"5s"`.

use crate::error::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Serializes [`Duration`] as a humantime string.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Records kept per metric name.
    pub max_entries: usize,
    /// Distinct metric names kept.
    pub max_metrics: usize,
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    #[serde(with = "humantime_serde")]
    pub prune_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_metrics: 1000,
            retention: Duration::from_secs(24 * 60 * 60),
            prune_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./reports/benchmark"),
        }
    }
}

/// Top-level configuration for a monitor, runner and reporter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub meter: MeterConfig,
    pub sampler: SamplerConfig,
    pub report: ReportConfig,
}

impl EngineConfig {
    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = match extension.as_str() {
            "toml" => toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            "json" => serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        debug!(path = %path.display(), "Loaded engine config");
        config.validate()?;
        Ok(config)
    }

    /// Apply `PERFSCOPE_*` overrides. Unrelated keys are ignored.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "PERFSCOPE_MAX_ENTRIES" => self.storage.max_entries = parse_count(key, value)?,
                "PERFSCOPE_MAX_METRICS" => self.storage.max_metrics = parse_count(key, value)?,
                "PERFSCOPE_RETENTION" => self.storage.retention = parse_duration(key, value)?,
                "PERFSCOPE_PRUNE_INTERVAL" => {
                    self.storage.prune_interval = parse_duration(key, value)?
                }
                "PERFSCOPE_COLLECTION_INTERVAL" => {
                    self.collection.interval = parse_duration(key, value)?
                }
                "PERFSCOPE_METER_TICK" => self.meter.tick_interval = parse_duration(key, value)?,
                "PERFSCOPE_SAMPLER_INTERVAL" => {
                    self.sampler.interval = parse_duration(key, value)?
                }
                "PERFSCOPE_REPORT_DIR" => self.report.output_dir = PathBuf::from(value),
                _ => continue,
            }
            debug!(key, value, "Applied config override");
        }
        Ok(())
    }

    /// Overrides from the process environment.
    pub fn with_process_env(mut self) -> Result<Self, ConfigError> {
        self.apply_env_overrides(std::env::vars())?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_nonzero("storage.max_entries", self.storage.max_entries as u64)?;
        require_nonzero("storage.max_metrics", self.storage.max_metrics as u64)?;
        require_positive("storage.retention", self.storage.retention)?;
        require_positive("storage.prune_interval", self.storage.prune_interval)?;
        require_positive("collection.interval", self.collection.interval)?;
        require_positive("meter.tick_interval", self.meter.tick_interval)?;
        require_positive("sampler.interval", self.sampler.interval)?;
        if self.report.output_dir.as_os_str().is_empty() {
            return Err(ValidationError::empty("report.output_dir"));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn require_nonzero(field: &str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        Err(ValidationError::below_minimum(field, 1, value))
    } else {
        Ok(())
    }
}

fn require_positive(field: &str, value: Duration) -> Result<(), ValidationError> {
    if value.is_zero() {
        Err(ValidationError::invalid(field, "duration must be greater than zero"))
    } else {
        Ok(())
    }
}
