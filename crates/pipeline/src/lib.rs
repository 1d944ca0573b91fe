//! Orchestration on top of the core and search crates.
//!
//! - [`ExtractionPipeline`]: one session from transcript to stored, indexed handoff
//! - [`BatchCoordinator`]: bounded, paced, failure-isolated import of the whole corpus

pub mod batch;
pub mod error;
pub mod extract;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchCoordinator, BatchFailure, BatchParams, ProgressFn, Summary, MAX_CONCURRENCY};
pub use error::PipelineError;
pub use extract::{ExtractOutcome, ExtractStatus, ExtractionPipeline};
pub use tokio_util::sync::CancellationToken;
