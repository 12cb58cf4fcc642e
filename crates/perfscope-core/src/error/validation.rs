//! Validation errors raised synchronously for malformed input.

/// A caller supplied a value the engine refuses to accept.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("{field} must be at least {min}, got {actual}")]
    BelowMinimum { field: String, min: u64, actual: u64 },

    #[error("percentile {0} is outside [0, 1]")]
    PercentileOutOfRange(f64),

    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: String, value: f64 },

    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: String, name: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    pub fn empty(field: impl Into<String>) -> Self {
        Self::Empty {
            field: field.into(),
        }
    }

    pub fn below_minimum(field: impl Into<String>, min: u64, actual: u64) -> Self {
        Self::BelowMinimum {
            field: field.into(),
            min,
            actual,
        }
    }

    pub fn non_finite(field: impl Into<String>, value: f64) -> Self {
        Self::NonFinite {
            field: field.into(),
            value,
        }
    }

    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Reject NaN and infinities.
    pub fn check_finite(field: &str, value: f64) -> Result<f64, Self> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Self::non_finite(field, value))
        }
    }
}
