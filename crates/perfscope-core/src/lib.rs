//! # Perfscope Core
//!
//! Building blocks shared by the metrics and benchmark crates:
//!
//! - **Collaborators**: [`Clock`], [`HostInfo`] and [`ReportSink`] are injected
//!   into every component so nothing reaches for ambient globals.
//! - **Statistics**: interpolated percentiles and summary distributions.
//! - **Background work**: [`PeriodicTask`] owns a ticking tokio task with an
//!   explicit, idempotent stop.
//! - **Configuration and logging**: [`EngineConfig`] and [`logging::init_logging`].

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod sink;
pub mod stats;
pub mod task;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    CollectionConfig, EngineConfig, MeterConfig, ReportConfig, SamplerConfig, StorageConfig,
};
pub use error::{ConfigError, CoreError, CoreResult, StorageError, ValidationError};
pub use host::{CpuInfo, HostInfo, HostSnapshot, MemoryInfo, ProcessUsage, StaticHost, SysinfoHost};
pub use logging::{LogFormat, init_logging};
pub use sink::{LocalFs, MemorySink, ReportSink};
pub use stats::Distribution;
pub use task::{PeriodicTask, TaskError, TickInfo};
