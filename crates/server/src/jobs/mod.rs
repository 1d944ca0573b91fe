//! Background job system for batch imports started over HTTP.
//!
//! Provides:
//! - `JobRunner`: spawns and tracks jobs
//! - `JobState`: atomic progress per job
//! - `JobProgress`: serializable snapshot

pub mod runner;
pub mod state;
pub mod types;

pub use runner::JobRunner;
pub use state::JobState;
pub use types::{JobId, JobProgress, JobStatus};
