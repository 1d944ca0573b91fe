// crates/core/src/llm/mod.rs
//! Language-model extraction providers.
//!
//! Provides the `Extractor` trait, the fixed handoff schema with its
//! validation, and two providers: the Claude CLI (interactive) and OpenRouter
//! (bulk).

pub mod claude_cli;
pub mod factory;
pub mod openrouter;
pub mod provider;
pub mod schema;
pub mod types;

pub use claude_cli::ClaudeCliExtractor;
pub use factory::{create_extractor, ProviderKind};
pub use openrouter::OpenRouterExtractor;
pub use provider::Extractor;
pub use schema::{validate_extraction, ValidatedExtraction};
pub use types::{ExtractError, ExtractedHandoff, ExtractionRequest};
