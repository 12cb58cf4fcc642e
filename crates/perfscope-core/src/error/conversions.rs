//! Umbrella error for operations that can fail in more than one way.

use super::config::ConfigError;
use super::storage::StorageError;
use super::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type CoreResult<T> = Result<T, CoreError>;
