// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use handoff_core::{ResolveError, StoreError};
use handoff_pipeline::PipelineError;
use handoff_search::{IndexError, QueryError};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(u64),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {err}"))
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound { path } => {
            tracing::error!(path = %path.display(), "Handoff file not found");
            (StatusCode::NOT_FOUND, "Handoff not found")
        }
        StoreError::PermissionDenied { path } => {
            tracing::error!(path = %path.display(), "Permission denied");
            (StatusCode::FORBIDDEN, "Permission denied")
        }
        StoreError::Io { path, source } => {
            tracing::error!(path = %path.display(), error = %source, "IO error");
            (StatusCode::INTERNAL_SERVER_ERROR, "IO error accessing handoff store")
        }
        StoreError::Malformed { path, message } => {
            tracing::error!(path = %path.display(), message = %message, "Malformed handoff");
            (StatusCode::INTERNAL_SERVER_ERROR, "Malformed handoff document")
        }
    }
}

fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::ResolutionFailed(resolve) => {
            tracing::warn!(error = %resolve, "Session resolution failed");
            match resolve {
                ResolveError::NotFound { .. } | ResolveError::ProjectsDirNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Session not found")
                }
                ResolveError::Ambiguous { .. } => (StatusCode::CONFLICT, "Ambiguous session id"),
                ResolveError::InvalidId { .. } => (StatusCode::BAD_REQUEST, "Invalid session id"),
            }
        }
        PipelineError::ExtractionFailed(msg) => {
            tracing::error!(message = %msg, "Extraction failed");
            (StatusCode::BAD_GATEWAY, "Extraction failed")
        }
        PipelineError::ValidationFailed(msg) => {
            tracing::warn!(message = %msg, "Extraction output rejected");
            (StatusCode::UNPROCESSABLE_ENTITY, "Extraction output invalid")
        }
        PipelineError::StoreError(store) => store_status(store),
        PipelineError::Index(index) => {
            tracing::error!(error = %index, "Index error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Index error")
        }
        PipelineError::Discovery(discovery) => {
            tracing::error!(error = %discovery, "Discovery error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Cannot access transcript directory")
        }
        PipelineError::InvalidParameter(msg) => {
            tracing::warn!(message = %msg, "Bad batch parameter");
            (StatusCode::BAD_REQUEST, "Bad request")
        }
        PipelineError::Cancelled => (StatusCode::CONFLICT, "Cancelled"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                )
            }
            ApiError::Pipeline(err) => {
                let (status, msg) = pipeline_status(err);
                (status, ErrorResponse::with_details(msg, err.to_string()))
            }
            ApiError::Query(err) => match err {
                QueryError::Store(store) => {
                    let (status, msg) = store_status(store);
                    (status, ErrorResponse::with_details(msg, err.to_string()))
                }
                _ => {
                    tracing::warn!(error = %err, "Bad retrieval query");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Bad request", err.to_string()),
                    )
                }
            },
            ApiError::Index(err) => {
                tracing::error!(error = %err, "Index error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Index error", err.to_string()),
                )
            }
            ApiError::Unavailable(msg) => {
                tracing::warn!(message = %msg, "Provider unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::with_details("Provider unavailable", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_job_not_found_returns_404() {
        let (status, body) = extract_response(ApiError::JobNotFound(7).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
        assert!(body.details.unwrap().contains('7'));
    }

    #[tokio::test]
    async fn test_invalid_query_returns_400() {
        let err = ApiError::Query(QueryError::InvalidMaxResults(0));
        let (status, body) = extract_response(err.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.details.unwrap().contains('0'));
    }

    #[tokio::test]
    async fn test_resolution_errors_map_by_kind() {
        let cases = [
            (ResolveError::not_found("nothing fresh"), StatusCode::NOT_FOUND),
            (
                ResolveError::Ambiguous {
                    id: "abcdef01".into(),
                    count: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                ResolveError::InvalidId {
                    id: "xyz".into(),
                    reason: "too short".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            let api: ApiError = PipelineError::from(err).into();
            let (status, body) = extract_response(api.into_response()).await;
            assert_eq!(status, expected);
            assert!(body.details.unwrap().contains("explicit session id"));
        }
    }

    #[tokio::test]
    async fn test_extraction_and_validation_failures() {
        let api: ApiError = PipelineError::ExtractionFailed("HTTP 502".into()).into();
        let (status, _) = extract_response(api.into_response()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let api: ApiError = PipelineError::ValidationFailed("no keywords".into()).into();
        let (status, body) = extract_response(api.into_response()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.details.unwrap().contains("no keywords"));
    }

    #[tokio::test]
    async fn test_store_not_found_returns_404() {
        let api: ApiError = PipelineError::StoreError(StoreError::NotFound {
            path: PathBuf::from("/data/handoffs/2026/03/01/x.md"),
        })
        .into();
        let (status, body) = extract_response(api.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Handoff not found");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) =
            extract_response(ApiError::Internal("lock poisoned".into()).into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_string(&ErrorResponse::new("Test error")).unwrap();
        assert!(json.contains("\"error\":\"Test error\""));
        assert!(!json.contains("details"));

        let json =
            serde_json::to_string(&ErrorResponse::with_details("Test error", "More info")).unwrap();
        assert!(json.contains("\"details\":\"More info\""));
    }
}
