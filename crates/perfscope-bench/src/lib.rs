//! # Perfscope Bench
//!
//! Register benchmark cases, run them through a fixed lifecycle and report
//! the results.
//!
//! ```text
//! BenchmarkCase -> BenchmarkRunner (+ SystemSampler) -> BenchmarkResult -> BenchmarkReporter
//! ```
//!
//! ```ignore
//! let runner = BenchmarkRunner::with_defaults();
//! runner.register_case(create_case(
//!     BenchmarkConfig::new("parse", BenchmarkType::Latency, BenchmarkLevel::Unit)
//!         .iterations(200)
//!         .threshold("duration", StatKey::P95, 5.0),
//!     |_ctx| async { parse_fixture().map_err(Into::into) },
//! ))?;
//!
//! let results = runner.run_all().await;
//! BenchmarkReporter::with_defaults().report_many(&results)?;
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod reporter;
pub mod result;
pub mod runner;
pub mod sampler;

pub use case::{BenchmarkCase, FnCase, IterationContext, create_case};
pub use config::{BenchmarkConfig, BenchmarkLevel, BenchmarkType, StatKey, Thresholds};
pub use error::{BenchError, BenchResult, ExecutionError, Phase, WorkloadError};
pub use reporter::{
    BenchmarkReporter, CaseComparison, ChangeDirection, ComparisonSummary, Delta, ExportFormat,
    compare, histogram,
};
pub use result::{
    BenchmarkContext, BenchmarkResult, CPU_METRIC, DURATION_METRIC, EVENT_LOOP_METRIC,
    MEMORY_METRIC, MetricStats, ThresholdCheck, ThresholdValidation, validate_thresholds,
};
pub use runner::{BenchmarkRunner, CaseState};
pub use sampler::{SystemSample, SystemSampler, SystemSeries};
