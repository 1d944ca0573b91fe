//! Extract a session, then retrieve it through the search crate.

use std::sync::Arc;

use async_trait::async_trait;
use handoff_core::llm::{ExtractError, ExtractedHandoff, ExtractionRequest, Extractor};
use handoff_core::{HandoffStore, JsonlNormalizer, SessionResolver};
use handoff_pipeline::{ExtractStatus, ExtractionPipeline};
use handoff_search::{query, render_markdown, IndexEngine, RetrievalQuery};

struct RouterExtractor;

#[async_trait]
impl Extractor for RouterExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractedHandoff, ExtractError> {
        assert!(request.transcript.contains("## User"));
        Ok(ExtractedHandoff {
            headline: Some("Rebuilt the request router".into()),
            projects: vec!["gateway".into()],
            keywords: vec![
                "request-routing".into(),
                "middleware".into(),
                "axum".into(),
                "timeouts".into(),
                "tower".into(),
            ],
            substance: Some(serde_json::json!(1)),
            what_happened: Some("Moved routing into a tower layer.".into()),
            open_threads: Some("Benchmark the new layer.".into()),
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "router"
    }

    fn model(&self) -> &str {
        "test"
    }
}

fn write_transcript(dir: &std::path::Path, id: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let mut lines = Vec::new();
    for i in 0..3 {
        lines.push(format!(
            r#"{{"type":"user","timestamp":"2026-03-01T09:0{i}:00Z","message":{{"content":"route step {i}"}}}}"#
        ));
        lines.push(format!(
            r#"{{"type":"assistant","timestamp":"2026-03-01T09:0{i}:40Z","message":{{"content":[{{"type":"text","text":"ok {i}"}}]}}}}"#
        ));
    }
    std::fs::write(dir.join(format!("{id}.jsonl")), lines.join("\n")).unwrap();
}

#[tokio::test]
async fn extracted_handoff_is_retrievable_by_keyword_segment() {
    let tmp = tempfile::tempdir().unwrap();
    let sessions = tmp.path().join("projects");
    let id = "9a8b7c6d-1111-4222-8333-444455556666";
    write_transcript(&sessions.join("-srv-gateway"), id);

    let store = HandoffStore::new(tmp.path().join("handoffs"));
    let index = Arc::new(IndexEngine::open(&tmp.path().join("handoff-index.json"), &store).unwrap());
    let pipeline = ExtractionPipeline::new(
        store.clone(),
        Arc::clone(&index),
        Arc::new(JsonlNormalizer),
        Arc::new(RouterExtractor),
    );
    let resolver = SessionResolver::new(&sessions, tmp.path().join("tasks"));

    let outcome = pipeline.extract(&resolver, Some(id)).await.unwrap();
    assert_eq!(outcome.status, ExtractStatus::Extracted);

    let q = RetrievalQuery::new(Some("what about routing?".into()), 3, 3).unwrap();
    let found = query(&index, &store, &q).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].session_id, id);
    assert!(render_markdown(&found).contains("# Rebuilt the request router"));

    // The persisted index survives a reopen.
    let reopened = IndexEngine::open(&tmp.path().join("handoff-index.json"), &store).unwrap();
    assert!(reopened.lookup("request-routing").contains(id));
}
