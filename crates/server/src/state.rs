// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use handoff_core::llm::Extractor;
use handoff_core::{HandoffConfig, HandoffStore, JsonlNormalizer, SessionResolver};
use handoff_pipeline::{BatchCoordinator, ExtractionPipeline};
use handoff_search::{IndexEngine, IndexError};

use crate::jobs::JobRunner;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub start_time: Instant,
    pub config: HandoffConfig,
    pub store: HandoffStore,
    /// The one index engine every pipeline writes through.
    pub index: Arc<IndexEngine>,
    pub resolver: SessionResolver,
    /// Interactive provider, used by `POST /api/extract`.
    pub interactive: Arc<ExtractionPipeline>,
    /// Bulk provider. `None` when it is not configured.
    pub bulk: Option<Arc<ExtractionPipeline>>,
    pub jobs: Arc<JobRunner>,
}

impl AppState {
    /// Open the persisted index (rebuilding it if needed) and wire both
    /// pipelines to it.
    pub fn open(
        config: HandoffConfig,
        interactive: Arc<dyn Extractor>,
        bulk: Option<Arc<dyn Extractor>>,
    ) -> Result<Arc<Self>, IndexError> {
        let store = HandoffStore::new(&config.handoffs_dir);
        let index = Arc::new(IndexEngine::open(&config.index_path, &store)?);
        Ok(Self::new(config, index, interactive, bulk))
    }

    pub fn new(
        config: HandoffConfig,
        index: Arc<IndexEngine>,
        interactive: Arc<dyn Extractor>,
        bulk: Option<Arc<dyn Extractor>>,
    ) -> Arc<Self> {
        let store = HandoffStore::new(&config.handoffs_dir);
        let pipeline = |extractor: Arc<dyn Extractor>| {
            Arc::new(ExtractionPipeline::new(
                store.clone(),
                Arc::clone(&index),
                Arc::new(JsonlNormalizer),
                extractor,
            ))
        };
        let interactive = pipeline(interactive);
        let bulk = bulk.map(pipeline);

        Arc::new(Self {
            start_time: Instant::now(),
            resolver: SessionResolver::from_config(&config),
            store,
            index,
            interactive,
            bulk,
            jobs: Arc::new(JobRunner::new()),
            config,
        })
    }

    /// Coordinator for a batch run. Dry runs never call a provider, so they
    /// fall back to the interactive pipeline when no bulk provider exists.
    pub fn batch_coordinator(&self, dry_run: bool) -> Option<BatchCoordinator> {
        let pipeline = match (&self.bulk, dry_run) {
            (Some(bulk), _) => Arc::clone(bulk),
            (None, true) => Arc::clone(&self.interactive),
            (None, false) => return None,
        };
        Some(BatchCoordinator::new(pipeline, &self.config.sessions_dir))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
