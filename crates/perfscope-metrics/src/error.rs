use perfscope_core::{TaskError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("background task failed: {0}")]
    Task(#[from] TaskError),
}

pub type MetricsResult<T> = Result<T, MetricsError>;
