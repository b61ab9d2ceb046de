use thiserror::Error;

/// Failures surfaced by the sampling core.
///
/// Only `NumericDegeneracy` is fatal for a stream. Insufficient data and
/// exponent overflow are never reported through this type; they resolve to
/// documented defaults at the point of detection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    /// Singular innovation covariance or NaN/Inf in the filter state.
    #[error("numeric degeneracy in {stage}: {detail}")]
    NumericDegeneracy { stage: &'static str, detail: String },

    /// Input that violates the ordering/shape contract of a collaborator.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SamplerError {
    pub fn degenerate(stage: &'static str, detail: impl Into<String>) -> Self {
        SamplerError::NumericDegeneracy { stage, detail: detail.into() }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SamplerError::NumericDegeneracy { .. })
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
