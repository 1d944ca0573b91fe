// crates/pipeline/src/extract.rs
//! Extraction orchestrator: resolve -> dedup -> normalize -> extract ->
//! validate -> store write + index upsert.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use handoff_core::llm::{validate_extraction, ExtractionRequest, Extractor};
use handoff_core::{
    project_display_name, Handoff, HandoffStore, Normalizer, SessionReference, SessionResolver,
    StoreError,
};
use handoff_search::IndexEngine;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStatus {
    /// A new handoff was written.
    Extracted,
    /// The transcript has not changed since the stored handoff was made.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub status: ExtractStatus,
    pub handoff: Handoff,
}

/// One extractor wired to the shared store and index.
pub struct ExtractionPipeline {
    store: HandoffStore,
    index: Arc<IndexEngine>,
    normalizer: Arc<dyn Normalizer>,
    extractor: Arc<dyn Extractor>,
}

impl ExtractionPipeline {
    pub fn new(
        store: HandoffStore,
        index: Arc<IndexEngine>,
        normalizer: Arc<dyn Normalizer>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            store,
            index,
            normalizer,
            extractor,
        }
    }

    pub fn store(&self) -> &HandoffStore {
        &self.store
    }

    pub fn index(&self) -> &Arc<IndexEngine> {
        &self.index
    }

    /// Resolve the session (explicit id or fallback chain) and extract it.
    pub async fn extract(
        &self,
        resolver: &SessionResolver,
        explicit_id: Option<&str>,
    ) -> Result<ExtractOutcome, PipelineError> {
        let reference = resolver.resolve(explicit_id)?;
        self.extract_reference(&reference, false).await
    }

    /// Extract an already-resolved transcript. With `force`, the unchanged
    /// short-circuit is skipped.
    pub async fn extract_reference(
        &self,
        reference: &SessionReference,
        force: bool,
    ) -> Result<ExtractOutcome, PipelineError> {
        let session_id = reference.session_id.clone();
        let source_mtime = reference.modified_unix_ms();

        if !force {
            if let Some(existing) = self.unchanged(&session_id, source_mtime)? {
                debug!(session_id = %session_id, "transcript unchanged, reusing handoff");
                return Ok(ExtractOutcome {
                    status: ExtractStatus::Unchanged,
                    handoff: existing,
                });
            }
        }

        let t0 = Instant::now();
        let normalizer = Arc::clone(&self.normalizer);
        let path = reference.path.clone();
        let (transcript, project_hint) = tokio::task::spawn_blocking(move || {
            let hint = path
                .parent()
                .and_then(|dir| dir.file_name())
                .map(|name| project_display_name(&name.to_string_lossy()))
                .filter(|name| !name.is_empty());
            normalizer.normalize(&path).map(|text| (text, hint))
        })
        .await??;

        let raw = self
            .extractor
            .extract(ExtractionRequest {
                session_id: session_id.clone(),
                project_hint,
                transcript,
            })
            .await?;
        let handoff = validate_extraction(raw)?.into_handoff(
            session_id,
            Utc::now().date_naive(),
            Some(source_mtime),
            Some(self.extractor.model().to_string()),
        );

        let handoff = self.commit(handoff).await?;
        info!(
            session_id = %handoff.session_id,
            provider = self.extractor.name(),
            substance = %handoff.substance,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "handoff extracted"
        );
        Ok(ExtractOutcome {
            status: ExtractStatus::Extracted,
            handoff,
        })
    }

    /// The stored handoff for `session_id` if it was made from a transcript
    /// at least as new as `source_mtime`.
    fn unchanged(
        &self,
        session_id: &str,
        source_mtime: i64,
    ) -> Result<Option<Handoff>, PipelineError> {
        let Some(meta) = self.index.metadata(session_id) else {
            return Ok(None);
        };
        if !meta.source_mtime.is_some_and(|recorded| source_mtime <= recorded) {
            return Ok(None);
        }
        match self.store.load(session_id, meta.date) {
            Ok(handoff) => Ok(Some(handoff)),
            // Deleted or damaged by hand: extract again.
            Err(StoreError::NotFound { .. } | StoreError::Malformed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write and index as one step. Runs to completion even if the caller's
    /// future is dropped.
    async fn commit(&self, handoff: Handoff) -> Result<Handoff, PipelineError> {
        let store = self.store.clone();
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || -> Result<Handoff, PipelineError> {
            store.write(&handoff)?;
            index.upsert(&handoff)?;
            Ok(handoff)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_transcript, CountingExtractor};
    use handoff_core::JsonlNormalizer;
    use handoff_core::{ResolveError, Substance};
    use pretty_assertions::assert_eq;

    fn pipeline(root: &std::path::Path, extractor: Arc<CountingExtractor>) -> ExtractionPipeline {
        ExtractionPipeline::new(
            HandoffStore::new(root.join("handoffs")),
            Arc::new(IndexEngine::in_memory()),
            Arc::new(JsonlNormalizer),
            extractor,
        )
    }

    #[tokio::test]
    async fn test_extract_twice_calls_provider_once() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        let id = "1b2f6f6b-65a6-42ff-aca7-34889b422799";
        write_transcript(&sessions.join("-home-u-app"), id, 4);
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline(tmp.path(), extractor.clone());

        let first = pipeline.extract(&resolver, Some(id)).await.unwrap();
        assert_eq!(first.status, ExtractStatus::Extracted);
        assert_eq!(first.handoff.session_id, id);
        assert_eq!(first.handoff.model.as_deref(), Some("fake-model"));
        assert!(pipeline.index().contains(id));

        let second = pipeline.extract(&resolver, Some("1b2f6f6b")).await.unwrap();
        assert_eq!(second.status, ExtractStatus::Unchanged);
        assert_eq!(second.handoff, first.handoff);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_returns_what_extract_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        let id = "4e3f6f6b-65a6-42ff-aca7-34889b422799";
        write_transcript(&sessions.join("-home-u-app"), id, 4);
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

        // Single-task answers still carry key_files; the stored document omits them.
        let extractor = Arc::new(CountingExtractor::default().with_substance(1));
        let pipeline = pipeline(tmp.path(), extractor.clone());

        let first = pipeline.extract(&resolver, Some(id)).await.unwrap();
        assert_eq!(first.status, ExtractStatus::Extracted);
        assert_eq!(first.handoff.substance, Substance::SingleTask);
        assert!(first.handoff.body.key_files.is_none());

        let second = pipeline.extract(&resolver, Some(id)).await.unwrap();
        assert_eq!(second.status, ExtractStatus::Unchanged);
        assert_eq!(second.handoff, first.handoff);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_append_within_same_second_is_extracted_again() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        let id = "5f3f6f6b-65a6-42ff-aca7-34889b422799";
        let path = write_transcript(&sessions.join("-home-u-app"), id, 4);
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));
        let set_mtime = |offset_ms: u64| {
            let at = std::time::UNIX_EPOCH
                + std::time::Duration::from_secs(1_772_371_200)
                + std::time::Duration::from_millis(offset_ms);
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(at)
                .unwrap();
        };

        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline(tmp.path(), extractor.clone());
        set_mtime(100);
        pipeline.extract(&resolver, Some(id)).await.unwrap();

        set_mtime(600);
        let again = pipeline.extract(&resolver, Some(id)).await.unwrap();
        assert_eq!(again.status, ExtractStatus::Extracted);
        assert_eq!(again.handoff.source_mtime, Some(1_772_371_200_600));
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        let id = "2c3f6f6b-65a6-42ff-aca7-34889b422799";
        write_transcript(&sessions.join("-home-u-app"), id, 4);
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

        let extractor = Arc::new(CountingExtractor::default().with_invalid_for(id));
        let pipeline = pipeline(tmp.path(), extractor.clone());

        let err = pipeline.extract(&resolver, Some(id)).await.unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailed(_)));
        assert!(!pipeline.index().contains(id));
        assert!(pipeline.store().list_paths().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        std::fs::create_dir_all(&sessions).unwrap();
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline(tmp.path(), extractor.clone());

        let err = pipeline.extract(&resolver, Some("deadbeef")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResolutionFailed(ResolveError::NotFound { .. })
        ));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_touched_transcript_is_extracted_again() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = tmp.path().join("projects");
        let id = "3d3f6f6b-65a6-42ff-aca7-34889b422799";
        let path = write_transcript(&sessions.join("-home-u-app"), id, 4);
        let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

        let extractor = Arc::new(CountingExtractor::default());
        let pipeline = pipeline(tmp.path(), extractor.clone());
        pipeline.extract(&resolver, Some(id)).await.unwrap();

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(120);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let again = pipeline.extract(&resolver, Some(id)).await.unwrap();
        assert_eq!(again.status, ExtractStatus::Extracted);
        assert_eq!(extractor.calls(), 2);
    }
}
