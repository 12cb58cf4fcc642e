//! # Perfscope
//!
//! Embeddable performance monitoring and benchmarking.
//!
//! This crate re-exports the workspace crates behind one dependency:
//!
//! - [`core`]: clock, host and sink collaborators, statistics, configuration,
//!   logging and periodic tasks
//! - [`metrics`]: metric primitives, registry, collector, bounded storage and
//!   analysis
//! - [`bench`]: benchmark cases, runner, system sampler and reporter

pub mod error;

pub use perfscope_bench as bench;
pub use perfscope_core as core;
pub use perfscope_metrics as metrics;

pub use error::{PerfscopeError, PerfscopeResult};

pub use perfscope_bench::{
    BenchmarkCase, BenchmarkConfig, BenchmarkLevel, BenchmarkReporter, BenchmarkResult,
    BenchmarkRunner, BenchmarkType, ExportFormat, StatKey, create_case,
};
pub use perfscope_core::{EngineConfig, LogFormat, init_logging};
pub use perfscope_metrics::{
    Counter, Gauge, Histogram, Meter, MetricAnalyzer, MetricRegistry, MetricStorage,
    PerformanceMonitor, Timer,
};
