// crates/core/src/llm/factory.rs
//! Extractor factory: builds the configured provider for each call site.

use std::sync::Arc;

use super::claude_cli::ClaudeCliExtractor;
use super::openrouter::OpenRouterExtractor;
use super::provider::Extractor;
use super::types::ExtractError;
use crate::config::HandoffConfig;

/// Which extraction provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Claude CLI, used for single interactive extractions.
    ClaudeCli,
    /// OpenRouter, used for bulk imports.
    OpenRouter,
}

/// Create an extractor from configuration.
///
/// OpenRouter requires `OPENROUTER_API_KEY`; without it the bulk provider is
/// unavailable.
pub fn create_extractor(
    kind: ProviderKind,
    config: &HandoffConfig,
) -> Result<Arc<dyn Extractor>, ExtractError> {
    match kind {
        ProviderKind::ClaudeCli => Ok(Arc::new(
            ClaudeCliExtractor::new(&config.claude_model).with_timeout(config.claude_timeout_secs),
        )),
        ProviderKind::OpenRouter => {
            let key = config.openrouter_api_key.as_deref().ok_or_else(|| {
                ExtractError::NotAvailable("OPENROUTER_API_KEY is not set".into())
            })?;
            Ok(Arc::new(OpenRouterExtractor::new(key, &config.openrouter_model)?))
        }
    }
}
