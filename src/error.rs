//! Error types for the ETL pipeline.
//!
//! The error hierarchy uses `thiserror` and mirrors the pipeline's step
//! structure: every fatal error maps to the step it aborted, so failure
//! notifications can carry the failing step's identifier.

use serde::Serialize;
use thiserror::Error;

/// The main error type for the ETL pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Source connection or query failure during extraction.
    #[error("extraction failed: {0}")]
    Extract(#[source] sqlx::Error),

    /// Column was not found in the record set.
    #[error("column '{0}' not found in record set")]
    ColumnNotFound(String),

    /// A boolean-like column could not be coerced to integers.
    #[error("failed to coerce flag column '{column}' to integers: {reason}")]
    FlagCoercion { column: String, reason: String },

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Destination count query, insert or commit failure.
    #[error("load failed: {0}")]
    Load(#[source] sqlx::Error),

    /// Notification delivery failure. Never aborts a run; the pipeline
    /// logs it and continues.
    #[error("notification delivery failed: {0}")]
    Notify(String),

    /// DataFrame operation failure.
    #[error("dataframe operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// The pipeline step this error aborted, if any.
    ///
    /// Failure notifications include this identifier. Configuration and
    /// notification errors occur outside the extract/transform/load
    /// sequence and map to `None`.
    pub fn step(&self) -> Option<PipelineStep> {
        match self {
            Self::Extract(_) => Some(PipelineStep::Extract),
            Self::ColumnNotFound(_) | Self::FlagCoercion { .. } | Self::Polars(_) => {
                Some(PipelineStep::Transform)
            }
            Self::Load(_) => Some(PipelineStep::Load),
            Self::InvalidConfig(_) | Self::Notify(_) | Self::Io(_) => None,
        }
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Identifier of a pipeline step, as reported to the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Extract,
    Transform,
    Load,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Load => "load",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_mapping() {
        assert_eq!(
            EtlError::ColumnNotFound("price".to_string()).step(),
            Some(PipelineStep::Transform)
        );
        assert_eq!(
            EtlError::FlagCoercion {
                column: "studio".to_string(),
                reason: "cast failed".to_string(),
            }
            .step(),
            Some(PipelineStep::Transform)
        );
        assert_eq!(
            EtlError::InvalidConfig("bad threshold".to_string()).step(),
            None
        );
    }

    #[test]
    fn test_step_display() {
        assert_eq!(PipelineStep::Extract.to_string(), "extract");
        assert_eq!(PipelineStep::Transform.to_string(), "transform");
        assert_eq!(PipelineStep::Load.to_string(), "load");
    }
}
