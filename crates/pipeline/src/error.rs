// crates/pipeline/src/error.rs
use handoff_core::llm::ExtractError;
use handoff_core::{DiscoveryError, NormalizeError, ResolveError, StoreError};
use handoff_search::IndexError;
use thiserror::Error;

/// Failure of one orchestrated operation (an `extract` call or one batch unit).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ResolutionFailed(#[from] ResolveError),

    /// Normalizer or provider failed. Retryable by the caller.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Provider output violates the handoff schema. Not retried.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    StoreError(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("invalid batch parameter: {0}")]
    InvalidParameter(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<ExtractError> for PipelineError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::ValidationFailed(msg) => Self::ValidationFailed(msg),
            other => Self::ExtractionFailed(other.to_string()),
        }
    }
}

impl From<NormalizeError> for PipelineError {
    fn from(err: NormalizeError) -> Self {
        Self::ExtractionFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::ExtractionFailed(format!("worker task panicked: {err}"))
        }
    }
}
