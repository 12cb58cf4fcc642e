//! Error Types
//!
//! Structured errors shared by the Perfscope crates. Degenerate statistical
//! states (empty input, zero variance) are never errors; these types only
//! cover caller mistakes and I/O faults.
//!
//! The error types are organized into focused submodules:
//! - `validation`: malformed configuration or arguments
//! - `storage`: filesystem and serialization failures during export
//! - `config`: engine configuration loading
//! - `conversions`: the umbrella [`CoreError`] and its `From` impls

mod config;
mod conversions;
mod storage;
mod validation;

pub use config::ConfigError;
pub use conversions::{CoreError, CoreResult};
pub use storage::StorageError;
pub use validation::ValidationError;
