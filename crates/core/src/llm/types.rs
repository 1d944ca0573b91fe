// crates/core/src/llm/types.rs
//! Request/response/error types for handoff extraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical transcript text handed to an extractor.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub session_id: String,
    /// Human-readable project name derived from the transcript location.
    pub project_hint: Option<String>,
    /// Normalized transcript text.
    pub transcript: String,
}

/// Raw structured output from a provider, before validation.
///
/// Every field is lenient (`Option`, `serde_json::Value` for substance) so
/// that a malformed answer is reported by [`validate_extraction`] as a
/// validation failure instead of a parse error.
///
/// [`validate_extraction`]: super::schema::validate_extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedHandoff {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub substance: Option<serde_json::Value>,
    #[serde(default)]
    pub what_happened: Option<String>,
    #[serde(default)]
    pub insights: Option<String>,
    #[serde(default)]
    pub key_files: Option<String>,
    #[serde(default)]
    pub open_threads: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Errors that can occur during extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The provider answered, but the answer violates the handoff schema.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The provider was reachable but failed (non-zero exit, HTTP error, unparseable body).
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

impl ExtractError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_handoff_lenient_deserialize() {
        let json = r#"{"headline": "Fix the router", "substance": "two"}"#;
        let raw: ExtractedHandoff = serde_json::from_str(json).unwrap();
        assert_eq!(raw.headline.as_deref(), Some("Fix the router"));
        assert!(raw.keywords.is_empty());
        assert_eq!(raw.substance, Some(serde_json::json!("two")));
    }

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::Timeout(180);
        assert_eq!(err.to_string(), "Timeout after 180 seconds");

        let err = ExtractError::ValidationFailed("headline too short".into());
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation failed: headline too short");
    }
}
