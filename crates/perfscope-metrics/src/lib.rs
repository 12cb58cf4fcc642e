//! # Perfscope Metrics
//!
//! In-process metrics with a pull-based pipeline:
//!
//! ```text
//! instrumented code -> MetricRegistry -> Collector -> MetricStorage -> MetricAnalyzer
//! ```
//!
//! - [`primitives`]: counters, gauges, histograms, timers and EWMA meters
//! - [`registry`]: idempotent `(name, kind)` instrument lookup
//! - [`collector`]: periodic snapshots delivered to a [`MetricSink`]
//! - [`storage`]: bounded per-name rings with query and bucketed history
//! - [`analyzer`]: summaries, z-score anomalies and least-squares trends
//! - [`monitor`]: [`PerformanceMonitor`], which owns and runs all of the above

pub mod analyzer;
pub mod collector;
pub mod error;
pub mod metric;
pub mod monitor;
pub mod primitives;
pub mod registry;
pub mod storage;

pub use analyzer::{
    AnalysisResult, AnalysisSummary, AnalyzeOptions, Anomaly, AnomalyOptions, Comparison,
    ForecastPoint, MetricAnalyzer, Severity, Trend, TrendDirection, TrendOptions,
};
pub use collector::{Collector, MetricSink, NullSink};
pub use error::{MetricsError, MetricsResult};
pub use metric::{Metric, MetricKind, MetricOptions, MetricValue, TagValue, Tags};
pub use monitor::{PerformanceMonitor, StorageSink};
pub use primitives::{Counter, Gauge, Histogram, Instrument, Meter, Timer, TimerGuard};
pub use registry::{MetricHandle, MetricRegistry};
pub use storage::{
    Aggregation, HistoryOptions, MetricQuery, MetricRecord, MetricStorage, SortField, SortOrder,
    StorageOptions,
};
