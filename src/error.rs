//! Error types for the cleaning pipeline.
//!
//! Only fatal conditions live here. Data-quality warnings (missing unit price,
//! discount above total, negative loyalty points) are recorded as flags on the
//! staging record and never surface as errors.

use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A value did not match the expected textual format.
    #[error("row {identity}: column '{column}' value '{value}' is malformed: {reason}")]
    Format {
        identity: u64,
        column: &'static str,
        value: String,
        reason: String,
    },

    /// A required input column is absent from the header row.
    #[error("required column '{column}' not found in input headers")]
    MissingColumn { column: String },

    /// A published invariant does not hold.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A persisted index was written by an incompatible build.
    #[error("unsupported index version {found} (expected {expected})")]
    IndexVersion { found: u32, expected: u32 },
}

impl PipelineError {
    pub fn format(
        identity: u64,
        column: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::Format {
            identity,
            column,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True when the quarantine policy may absorb this error instead of failing.
    pub fn is_format(&self) -> bool {
        matches!(self, PipelineError::Format { .. })
    }
}
