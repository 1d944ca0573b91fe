// crates/core/src/lib.rs
pub mod claude_path;
pub mod config;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod paths;
pub mod process;
pub mod resolver;
pub mod store;
pub mod transcript;
pub mod types;

pub use claude_path::resolved_cli_path;
pub use config::HandoffConfig;
pub use discovery::*;
pub use error::*;
pub use normalize::{JsonlNormalizer, Normalizer};
pub use process::{ProcessInspector, SystemProcessInspector};
pub use resolver::{ResolveStrategy, SessionResolver, FRESHNESS_WINDOW};
pub use store::HandoffStore;
pub use transcript::{scan_transcript, TranscriptStats};
pub use types::*;
