//! Benchmark errors.
//!
//! [`ExecutionError`] is data, not control flow: the runner stores it in
//! [`BenchmarkResult::error`](crate::BenchmarkResult::error) and carries on
//! with the next case. [`BenchError`] is what the runner itself returns.

use perfscope_core::{StorageError, TaskError, ValidationError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;

/// Error type returned by workload closures and case hooks.
pub type WorkloadError = Box<dyn StdError + Send + Sync>;

/// Lifecycle phase of a benchmark case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Warmup,
    Execute,
    Teardown,
    Validate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Warmup => "warmup",
            Self::Execute => "execute",
            Self::Teardown => "teardown",
            Self::Validate => "validate",
        })
    }
}

/// A failure or panic raised by a case during one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{phase} failed: {message}")]
pub struct ExecutionError {
    pub phase: Phase,
    pub message: String,
    /// Debug rendering plus the chain of sources, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ExecutionError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            stack: None,
        }
    }

    pub fn from_error(phase: Phase, error: &(dyn StdError + 'static)) -> Self {
        let mut stack = format!("{error:?}");
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\nCaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            phase,
            message: error.to_string(),
            stack: Some(stack),
        }
    }

    pub fn from_panic(phase: Phase, payload: Box<dyn Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(phase, format!("panicked: {detail}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("benchmark case '{0}' not found")]
    CaseNotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct Inner;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct Outer(#[source] Inner);

    #[test]
    fn test_from_error_keeps_source_chain() {
        let error = ExecutionError::from_error(Phase::Execute, &Outer(Inner));
        assert_eq!(error.message, "query failed");
        assert!(error.stack.as_deref().unwrap().contains("Caused by: connection refused"));
        assert_eq!(error.to_string(), "execute failed: query failed");
    }

    #[test]
    fn test_from_panic_payloads() {
        let error = ExecutionError::from_panic(Phase::Setup, Box::new("boom"));
        assert_eq!(error.message, "panicked: boom");

        let error = ExecutionError::from_panic(Phase::Warmup, Box::new(String::from("bad state")));
        assert_eq!(error.message, "panicked: bad state");

        let error = ExecutionError::from_panic(Phase::Execute, Box::new(42u8));
        assert!(error.message.contains("non-string"));
    }

    #[test]
    fn test_case_not_found_message() {
        let error = BenchError::CaseNotFound("missing".to_string());
        assert_eq!(error.to_string(), "benchmark case 'missing' not found");
    }
}
