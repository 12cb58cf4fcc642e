//! Error types and utilities.
//!
//! [`PerfscopeError`] wraps the error type of each workspace crate so
//! applications can use a single `?`-friendly result type.

use perfscope_bench::BenchError;
use perfscope_core::{ConfigError, CoreError, StorageError, TaskError, ValidationError};
use perfscope_metrics::MetricsError;

#[derive(Debug, thiserror::Error)]
pub enum PerfscopeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Bench(#[from] BenchError),
}

pub type PerfscopeResult<T> = Result<T, PerfscopeError>;

impl From<ValidationError> for PerfscopeError {
    fn from(err: ValidationError) -> Self {
        Self::Core(CoreError::from(err))
    }
}

impl From<StorageError> for PerfscopeError {
    fn from(err: StorageError) -> Self {
        Self::Core(CoreError::from(err))
    }
}

impl From<ConfigError> for PerfscopeError {
    fn from(err: ConfigError) -> Self {
        Self::Core(CoreError::from(err))
    }
}

impl From<TaskError> for PerfscopeError {
    fn from(err: TaskError) -> Self {
        Self::Metrics(MetricsError::from(err))
    }
}
