//! Atomic state tracking for a single background job.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use handoff_pipeline::Summary;
use tokio_util::sync::CancellationToken;

use super::types::{JobId, JobProgress, JobStatus};

/// Progress counters are atomics so the batch's progress callback never
/// blocks on a reader. Message and summary sit behind `RwLock`s.
pub struct JobState {
    id: JobId,
    job_type: String,
    status: AtomicU8,
    current: AtomicU64,
    total: AtomicU64,
    message: RwLock<Option<String>>,
    summary: RwLock<Option<Summary>>,
    cancel: CancellationToken,
}

impl JobState {
    pub fn new(id: JobId, job_type: String, cancel: CancellationToken) -> Self {
        Self {
            id,
            job_type,
            status: AtomicU8::new(JobStatus::Pending as u8),
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            message: RwLock::new(None),
            summary: RwLock::new(None),
            cancel,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn set_running(&self) {
        self.status
            .store(JobStatus::Running as u8, Ordering::Relaxed);
    }

    pub fn set_progress(&self, current: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.current.store(current, Ordering::Relaxed);
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        match self.message.write() {
            Ok(mut guard) => *guard = Some(msg.into()),
            Err(e) => tracing::error!("RwLock poisoned writing message: {e}"),
        }
    }

    /// Record the final summary. A run that observed cancellation ends as
    /// `cancelled`, anything else as `completed`.
    pub fn complete(&self, summary: Summary) {
        let status = if summary.cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        match self.summary.write() {
            Ok(mut guard) => *guard = Some(summary),
            Err(e) => tracing::error!("RwLock poisoned writing summary: {e}"),
        }
        self.status.store(status as u8, Ordering::Relaxed);
    }

    pub fn fail(&self, error: impl Into<String>) {
        self.set_message(error);
        self.status
            .store(JobStatus::Failed as u8, Ordering::Relaxed);
    }

    /// Request cancellation. Returns false when the job already finished.
    pub fn cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn snapshot(&self) -> JobProgress {
        JobProgress {
            job_id: self.id,
            job_type: self.job_type.clone(),
            status: self.status().as_str().to_string(),
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            message: match self.message.read() {
                Ok(g) => g.clone(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading message: {e}");
                    None
                }
            },
            summary: match self.summary.read() {
                Ok(g) => g.clone(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading summary: {e}");
                    None
                }
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
