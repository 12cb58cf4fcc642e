//! Bounded, prunable in-memory time series store.
//!
//! Each metric name owns a ring of at most `max_entries` records behind its
//! own mutex. The name map is behind an `RwLock`; locks are always taken in
//! the order map, then ring.

use crate::metric::{Metric, MetricKind, Tags};
use chrono::{DateTime, Utc};
use perfscope_core::{PeriodicTask, SharedClock, StorageConfig, TaskError, ValidationError, stats};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

type Ring = Arc<Mutex<VecDeque<MetricRecord>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    pub max_entries: usize,
    pub max_metrics: usize,
    pub retention: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StorageOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_metrics: config.max_metrics,
            retention: config.retention,
        }
    }
}

/// A stored metric plus the wall-clock time it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    #[serde(flatten)]
    pub metric: Metric,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Timestamp,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter for [`MetricStorage::query`]. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricQuery {
    pub names: Vec<String>,
    pub kinds: Vec<MetricKind>,
    /// Every listed tag must be present with an equal value.
    pub tags: Tags,
    /// Inclusive epoch-millisecond bounds.
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub sort: Option<(SortField, SortOrder)>,
    pub limit: Option<usize>,
}

impl MetricQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn kind(mut self, kind: MetricKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<crate::metric::TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn between(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn since(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn until(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn sort_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Some((field, order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, metric: &Metric) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&metric.kind) {
            return false;
        }
        if self.start.is_some_and(|start| metric.timestamp < start)
            || self.end.is_some_and(|end| metric.timestamp > end)
        {
            return false;
        }
        self.tags
            .iter()
            .all(|(key, value)| metric.tags.get(key) == Some(value))
    }
}

/// Reduction applied to each history bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    None,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Median,
    P95,
    P99,
}

impl Aggregation {
    fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Self::None | Self::Avg => stats::mean(values),
            Self::Sum => values.iter().sum(),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => values.len() as f64,
            Self::Median => stats::percentile(values, 0.5),
            Self::P95 => stats::percentile(values, 0.95),
            Self::P99 => stats::percentile(values, 0.99),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryOptions {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub aggregation: Aggregation,
    /// Bucket width. Raw samples are returned when absent or zero.
    pub interval: Option<Duration>,
}

impl HistoryOptions {
    pub fn aggregated(aggregation: Aggregation, interval: Duration) -> Self {
        Self {
            aggregation,
            interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

pub struct MetricStorage {
    options: StorageOptions,
    clock: SharedClock,
    series: RwLock<HashMap<String, Ring>>,
    prune_task: Mutex<Option<PeriodicTask>>,
}

impl MetricStorage {
    pub fn new(options: StorageOptions, clock: SharedClock) -> Self {
        Self {
            options,
            clock,
            series: RwLock::new(HashMap::new()),
            prune_task: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Append one sample. Rejects an empty name or a non-finite value.
    pub fn store(&self, metric: Metric) -> Result<(), ValidationError> {
        validate(&metric)?;
        self.insert(metric);
        Ok(())
    }

    /// Store a batch. Nothing is stored if any sample is invalid.
    pub fn store_many(&self, metrics: impl IntoIterator<Item = Metric>) -> Result<usize, ValidationError> {
        let metrics: Vec<Metric> = metrics.into_iter().collect();
        for metric in &metrics {
            validate(metric)?;
        }
        let count = metrics.len();
        for metric in metrics {
            self.insert(metric);
        }
        Ok(count)
    }

    /// Push while the map guard is held, so prune and eviction never see a
    /// ring between its creation and its first sample.
    fn insert(&self, metric: Metric) {
        let record = MetricRecord {
            stored_at: self.clock.now_utc(),
            metric,
        };

        {
            let series = self.read_series();
            if let Some(ring) = series.get(record.metric.name.as_str()) {
                self.push_bounded(ring, record);
                return;
            }
        }

        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(ring) = series.get(record.metric.name.as_str()) {
            self.push_bounded(ring, record);
            return;
        }
        while series.len() >= self.options.max_metrics.max(1) {
            let Some(victim) = oldest_series(&series) else {
                break;
            };
            series.remove(&victim);
            debug!(metric = %victim, "Evicted metric series");
        }
        let name = record.metric.name.clone();
        series.insert(name, Arc::new(Mutex::new(VecDeque::from([record]))));
    }

    fn push_bounded(&self, ring: &Ring, record: MetricRecord) {
        let mut ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.push_back(record);
        while ring.len() > self.options.max_entries.max(1) {
            ring.pop_front();
        }
    }

    /// Drop samples older than the retention period and forget emptied
    /// names. Returns the number of samples removed.
    pub fn prune(&self) -> usize {
        let retention_ms = i64::try_from(self.options.retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_ms().saturating_sub(retention_ms);

        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        series.retain(|_, ring| {
            let mut ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
            let before = ring.len();
            ring.retain(|record| record.metric.timestamp >= cutoff);
            removed += before - ring.len();
            !ring.is_empty()
        });

        if removed > 0 {
            debug!(removed, cutoff, "Pruned expired metric samples");
        }
        removed
    }

    /// Prune every `interval` on a background task. Replaces a running one.
    pub fn start_pruning(self: &Arc<Self>, interval: Duration) -> Result<(), TaskError> {
        let storage = Arc::downgrade(self);
        let task = PeriodicTask::spawn("metric-storage-prune", interval, move |_| {
            if let Some(storage) = storage.upgrade() {
                storage.prune();
            }
        })?;
        let previous = self
            .prune_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_pruning(&self) -> bool {
        self.prune_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some_and(|task| task.stop())
    }

    pub fn is_pruning(&self) -> bool {
        self.prune_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn query(&self, query: &MetricQuery) -> Vec<MetricRecord> {
        let mut records: Vec<MetricRecord> = self
            .rings_named(&query.names)
            .into_iter()
            .flat_map(|ring| {
                let ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
                ring.iter()
                    .filter(|record| query.matches(&record.metric))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        if let Some((field, order)) = query.sort {
            records.sort_by(|a, b| {
                let ordering = match field {
                    SortField::Timestamp => a.metric.timestamp.cmp(&b.metric.timestamp),
                    SortField::Value => sort_value(&a.metric).total_cmp(&sort_value(&b.metric)),
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        records
    }

    /// The sample with the greatest timestamp. Ties go to the most recently
    /// stored.
    pub fn get_latest(&self, name: &str) -> Option<MetricRecord> {
        let ring = self.read_series().get(name).cloned()?;
        let ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.iter().max_by_key(|record| record.metric.timestamp).cloned()
    }

    /// Time-filtered samples for `name`, optionally reduced into fixed-width
    /// buckets aligned to the earliest sample.
    pub fn get_history(&self, name: &str, options: &HistoryOptions) -> Vec<Metric> {
        let query = MetricQuery {
            names: vec![name.to_string()],
            start: options.start,
            end: options.end,
            sort: Some((SortField::Timestamp, SortOrder::Asc)),
            ..MetricQuery::default()
        };
        let samples: Vec<Metric> = self.query(&query).into_iter().map(|r| r.metric).collect();

        let interval_ms = options
            .interval
            .map(|i| i64::try_from(i.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        if options.aggregation == Aggregation::None || interval_ms <= 0 {
            return samples;
        }
        let Some(first) = samples.first() else {
            return samples;
        };
        let origin = first.timestamp;

        let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for sample in &samples {
            if let Some(value) = sample.number() {
                let index = (sample.timestamp - origin) / interval_ms;
                buckets.entry(index).or_default().push(value);
            }
        }

        buckets
            .into_iter()
            .map(|(index, values)| {
                let mut point = Metric::new(
                    name,
                    first.kind,
                    options.aggregation.reduce(&values),
                    origin + index * interval_ms,
                )
                .with_tags(first.tags.clone())
                .with_attribute("samples", values.len() as f64);
                point.unit = first.unit.clone();
                point
            })
            .collect()
    }

    /// Every record, grouped by name in name order.
    pub fn export_records(&self) -> Vec<MetricRecord> {
        self.rings_named(&[])
            .into_iter()
            .flat_map(|ring| {
                ring.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.read_series()
            .values()
            .map(|ring| ring.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_series().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read_series(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Ring>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rings for `names` (all when empty), in name order.
    fn rings_named(&self, names: &[String]) -> Vec<Ring> {
        let series = self.read_series();
        let mut selected: Vec<(&String, &Ring)> = if names.is_empty() {
            series.iter().collect()
        } else {
            series
                .iter()
                .filter(|(name, _)| names.contains(*name))
                .collect()
        };
        selected.sort_by(|a, b| a.0.cmp(b.0));
        selected.into_iter().map(|(_, ring)| Arc::clone(ring)).collect()
    }
}

impl std::fmt::Debug for MetricStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricStorage")
            .field("options", &self.options)
            .field("metrics", &self.read_series().len())
            .finish()
    }
}

fn validate(metric: &Metric) -> Result<(), ValidationError> {
    if metric.name.trim().is_empty() {
        return Err(ValidationError::empty("metric name"));
    }
    if !metric.value.is_finite() {
        return Err(ValidationError::non_finite(
            format!("value of '{}'", metric.name),
            metric.number().unwrap_or(f64::NAN),
        ));
    }
    Ok(())
}

fn sort_value(metric: &Metric) -> f64 {
    metric.number().unwrap_or(f64::NEG_INFINITY)
}

/// Name whose oldest retained sample is the oldest overall. Empty rings go
/// first.
fn oldest_series(series: &HashMap<String, Ring>) -> Option<String> {
    series
        .iter()
        .map(|(name, ring)| {
            let front = ring
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .front()
                .map_or(i64::MIN, |record| record.metric.timestamp);
            (front, name)
        })
        .min()
        .map(|(_, name)| name.clone())
}
