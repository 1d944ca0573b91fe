//! Central job runner that manages all background jobs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use handoff_pipeline::Summary;
use tokio_util::sync::CancellationToken;

use super::state::JobState;
use super::types::{JobId, JobProgress};

/// Finished jobs kept for `GET /api/jobs/{id}` before the oldest are evicted.
pub const DEFAULT_FINISHED_RETENTION: usize = 64;

/// Thread-safe via `Arc` wrapping. Call `start_job` to spawn async work
/// with progress tracking and `cancel` to stop it between units.
pub struct JobRunner {
    next_id: AtomicU64,
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
    finished_retention: usize,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }

    /// Keep at most `finished_retention` finished jobs. Running jobs are
    /// never evicted.
    pub fn with_retention(finished_retention: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
            finished_retention,
        }
    }

    /// Start a new background job.
    ///
    /// The closure `f` receives the job's `Arc<JobState>` for progress
    /// reporting and a `CancellationToken` that `cancel` trips.
    pub fn start_job<F, Fut>(&self, job_type: impl Into<String>, f: F) -> JobId
    where
        F: FnOnce(Arc<JobState>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Summary, String>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let state = Arc::new(JobState::new(id, job_type.into(), cancel.clone()));

        match self.jobs.write() {
            Ok(mut jobs) => {
                evict_finished(&mut jobs, self.finished_retention);
                jobs.insert(id, Arc::clone(&state));
            }
            Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
        }

        tokio::spawn(async move {
            state.set_running();
            match f(Arc::clone(&state), cancel).await {
                Ok(summary) => state.complete(summary),
                Err(e) => {
                    tracing::warn!(job_id = id, error = %e, "job failed");
                    state.fail(e);
                }
            }
        });

        id
    }

    pub fn get_job(&self, id: JobId) -> Option<JobProgress> {
        self.state(id).map(|s| s.snapshot())
    }

    /// Request cancellation. `None` if the job is unknown, `Some(false)` if
    /// it already finished.
    pub fn cancel(&self, id: JobId) -> Option<bool> {
        self.state(id).map(|s| s.cancel())
    }

    /// All jobs that have not reached a terminal status.
    pub fn active_jobs(&self) -> Vec<JobProgress> {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .filter(|s| !s.status().is_terminal())
                .map(|s| s.snapshot())
                .collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        }
    }

    fn state(&self, id: JobId) -> Option<Arc<JobState>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }
}

/// Drop the oldest finished jobs beyond `keep`.
fn evict_finished(jobs: &mut HashMap<JobId, Arc<JobState>>, keep: usize) {
    let mut finished: Vec<JobId> = jobs
        .iter()
        .filter(|(_, s)| s.status().is_terminal())
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for id in &finished[..excess] {
        jobs.remove(id);
    }
    tracing::debug!(evicted = excess, "evicted finished jobs");
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
