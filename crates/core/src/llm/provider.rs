// crates/core/src/llm/provider.rs
//! Extractor trait defining the interface for language-model providers.

use async_trait::async_trait;

use super::types::{ExtractError, ExtractedHandoff, ExtractionRequest};

/// A provider that turns canonical transcript text into a raw handoff.
///
/// Implementations:
/// - `ClaudeCliExtractor`: spawns the `claude` CLI (interactive, high quality)
/// - `OpenRouterExtractor`: HTTP chat-completions API (bulk, economical)
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Run one extraction. Callers validate the result with
    /// [`validate_extraction`](super::schema::validate_extraction).
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractedHandoff, ExtractError>;

    /// Provider name for logging (e.g. "claude-cli", "openrouter").
    fn name(&self) -> &str;

    /// Model identifier (e.g. "sonnet").
    fn model(&self) -> &str;
}
