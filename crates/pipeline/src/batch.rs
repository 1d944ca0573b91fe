// crates/pipeline/src/batch.rs
//! Bulk import of the historical transcript corpus.
//!
//! A run plans first (scan, skip indexed, skip trivial, cap at `max`), then
//! drains the work list with `concurrency` workers. Each worker paces its own
//! provider calls by `delay_seconds`; a failed unit is recorded and the run
//! continues. Cancellation is checked between units only.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use handoff_core::{scan_corpus, scan_transcript, SessionReference, TranscriptFile};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::extract::ExtractionPipeline;

pub const MAX_CONCURRENCY: usize = 20;

/// Called with `(done, total)` after every finished unit.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParams {
    pub concurrency: usize,
    pub delay_seconds: f64,
    pub max: Option<usize>,
    pub reindex: bool,
    pub dry_run: bool,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            concurrency: handoff_core::config::DEFAULT_BATCH_CONCURRENCY,
            delay_seconds: handoff_core::config::DEFAULT_BATCH_DELAY_SECS,
            max: None,
            reindex: false,
            dry_run: false,
        }
    }
}

impl BatchParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(PipelineError::InvalidParameter(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if !self.delay_seconds.is_finite() || self.delay_seconds < 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "delay_seconds must be a non-negative number, got {}",
                self.delay_seconds
            )));
        }
        if self.max == Some(0) {
            return Err(PipelineError::InvalidParameter(
                "max must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub session_id: String,
    pub reason: String,
}

/// Aggregate report of one run. Every scanned transcript is accounted for in
/// exactly one of the skip counters, `deferred`, `succeeded`, `failed`, or
/// (when cancelled) left unprocessed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub scanned: usize,
    pub skipped_indexed: usize,
    pub skipped_trivial: usize,
    /// Units selected for processing in this run.
    pub queued: usize,
    /// Eligible units left for a later run by `max`.
    pub deferred: usize,
    pub succeeded: usize,
    pub failed: Vec<BatchFailure>,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl Summary {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Output of the planning phase.
#[derive(Debug, Default)]
struct Plan {
    summary: Summary,
    work: Vec<TranscriptFile>,
}

pub struct BatchCoordinator {
    pipeline: Arc<ExtractionPipeline>,
    sessions_dir: PathBuf,
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<ExtractionPipeline>, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            sessions_dir: sessions_dir.into(),
        }
    }

    pub async fn run(
        &self,
        params: &BatchParams,
        cancel: CancellationToken,
    ) -> Result<Summary, PipelineError> {
        self.run_with_progress(params, cancel, Arc::new(|_: usize, _: usize| {}))
            .await
    }

    pub async fn run_with_progress(
        &self,
        params: &BatchParams,
        cancel: CancellationToken,
        on_progress: ProgressFn,
    ) -> Result<Summary, PipelineError> {
        params.validate()?;
        let t0 = Instant::now();

        let sessions_dir = self.sessions_dir.clone();
        let index = Arc::clone(self.pipeline.index());
        let plan_params = params.clone();
        let Plan { mut summary, work } = tokio::task::spawn_blocking(move || {
            plan(&sessions_dir, &plan_params, |id| index.contains(id))
        })
        .await??;

        info!(
            scanned = summary.scanned,
            skipped_indexed = summary.skipped_indexed,
            skipped_trivial = summary.skipped_trivial,
            queued = summary.queued,
            deferred = summary.deferred,
            dry_run = params.dry_run,
            "batch planned"
        );
        if params.dry_run || work.is_empty() {
            return Ok(summary);
        }

        let total = work.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(work)));
        let tally = Arc::new(Mutex::new(Tally::default()));
        let done = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        for worker_id in 0..params.concurrency.min(total) {
            let ctx = WorkerContext {
                worker_id,
                pipeline: Arc::clone(&self.pipeline),
                queue: Arc::clone(&queue),
                tally: Arc::clone(&tally),
                cancel: cancel.clone(),
                delay: params.delay(),
                force: params.reindex,
                done: Arc::clone(&done),
                total,
                on_progress: Arc::clone(&on_progress),
            };
            workers.spawn(ctx.run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "batch worker aborted");
            }
        }

        let outcomes = std::mem::take(&mut *tally.lock().unwrap_or_else(PoisonError::into_inner));
        summary.succeeded += outcomes.succeeded;
        summary.failed.extend(outcomes.failed);
        summary.cancelled = cancel.is_cancelled();
        summary.failed.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "batch finished"
        );
        Ok(summary)
    }
}

/// Scan and filter the corpus. Newest transcripts come first.
fn plan(
    sessions_dir: &std::path::Path,
    params: &BatchParams,
    is_indexed: impl Fn(&str) -> bool,
) -> Result<Plan, PipelineError> {
    let mut corpus = scan_corpus(sessions_dir)?;
    corpus.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });

    let mut plan = Plan::default();
    plan.summary.scanned = corpus.len();
    plan.summary.dry_run = params.dry_run;

    for file in corpus {
        if !params.reindex && is_indexed(&file.session_id) {
            plan.summary.skipped_indexed += 1;
            continue;
        }
        match scan_transcript(&file.path) {
            Ok(stats) if stats.is_trivial() => plan.summary.skipped_trivial += 1,
            Ok(_) => plan.work.push(file),
            Err(e) => plan.summary.failed.push(BatchFailure {
                session_id: file.session_id,
                reason: e.to_string(),
            }),
        }
    }

    let eligible = plan.work.len();
    let cap = params.max.unwrap_or(eligible).min(eligible);
    plan.work.truncate(cap);
    plan.summary.queued = cap;
    plan.summary.deferred = eligible - cap;
    Ok(plan)
}

/// Outcomes recorded as each unit finishes, so a lost worker loses nothing.
#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: Vec<BatchFailure>,
}

struct WorkerContext {
    worker_id: usize,
    pipeline: Arc<ExtractionPipeline>,
    queue: Arc<Mutex<VecDeque<TranscriptFile>>>,
    tally: Arc<Mutex<Tally>>,
    cancel: CancellationToken,
    delay: Duration,
    force: bool,
    done: Arc<AtomicUsize>,
    total: usize,
    on_progress: ProgressFn,
}

impl WorkerContext {
    async fn run(self) {
        let mut first = true;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if !first && !self.delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(file) = next else {
                break;
            };
            first = false;

            let session_id = file.session_id.clone();
            let reference = SessionReference::from(file);
            let pipeline = Arc::clone(&self.pipeline);
            let force = self.force;
            // Own task per unit: a panic fails this unit, not the worker.
            let unit =
                tokio::spawn(async move { pipeline.extract_reference(&reference, force).await });
            let outcome = match unit.await {
                Ok(Ok(extracted)) => {
                    debug!(worker = self.worker_id, session_id = %session_id, status = ?extracted.status, "unit done");
                    Ok(())
                }
                Ok(Err(e)) => {
                    warn!(worker = self.worker_id, session_id = %session_id, error = %e, "unit failed");
                    Err(e.to_string())
                }
                Err(e) => {
                    warn!(worker = self.worker_id, session_id = %session_id, error = %e, "unit panicked");
                    Err(format!("extraction task failed: {e}"))
                }
            };
            self.record(session_id, outcome);

            let finished = self.done.fetch_add(1, Ordering::SeqCst) + 1;
            (self.on_progress)(finished, self.total);
        }
    }

    fn record(&self, session_id: String, outcome: Result<(), String>) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(()) => tally.succeeded += 1,
            Err(reason) => tally.failed.push(BatchFailure { session_id, reason }),
        }
    }
}
