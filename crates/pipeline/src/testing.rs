//! Fakes shared by the unit tests in this crate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use handoff_core::llm::{ExtractError, ExtractedHandoff, ExtractionRequest, Extractor};

/// Extractor that counts calls and answers from canned output.
#[derive(Default)]
pub struct CountingExtractor {
    calls: AtomicUsize,
    substance: Option<u8>,
    invalid: HashSet<String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl CountingExtractor {
    /// Answer with this substance instead of 2.
    pub fn with_substance(mut self, substance: u8) -> Self {
        self.substance = Some(substance);
        self
    }

    /// Answer with a too-short headline for `session_id`.
    pub fn with_invalid_for(mut self, session_id: &str) -> Self {
        self.invalid.insert(session_id.to_string());
        self
    }

    /// Fail with a provider error for `session_id`.
    pub fn with_failure_for(mut self, session_id: &str) -> Self {
        self.failing.insert(session_id.to_string());
        self
    }

    /// Panic mid-call for `session_id`.
    pub fn with_panic_for(mut self, session_id: &str) -> Self {
        self.panicking.insert(session_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for CountingExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractedHandoff, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(&request.session_id) {
            panic!("extractor blew up on {}", request.session_id);
        }
        if self.failing.contains(&request.session_id) {
            return Err(ExtractError::ProviderError("HTTP 502".into()));
        }
        let headline = if self.invalid.contains(&request.session_id) {
            "ok"
        } else {
            "Wired the session resolver"
        };
        Ok(ExtractedHandoff {
            headline: Some(headline.into()),
            projects: vec!["handoff".into()],
            keywords: vec!["session-resolver".into(), "Process Lineage".into()],
            substance: Some(serde_json::json!(self.substance.unwrap_or(2))),
            what_happened: Some("Built the fallback chain.".into()),
            insights: None,
            key_files: Some("src/resolver.rs".into()),
            open_threads: Some("Wire the CLI.".into()),
            duration: Some("20m".into()),
            date: None,
        })
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Write a transcript with `exchanges` user/assistant pairs a minute apart.
pub fn write_transcript(project_dir: &Path, session_id: &str, exchanges: usize) -> PathBuf {
    std::fs::create_dir_all(project_dir).unwrap();
    let mut lines = Vec::new();
    for i in 0..exchanges {
        lines.push(format!(
            r#"{{"type":"user","timestamp":"2026-03-01T10:{i:02}:00Z","message":{{"role":"user","content":"Step {i}"}}}}"#
        ));
        lines.push(format!(
            r#"{{"type":"assistant","timestamp":"2026-03-01T10:{i:02}:30Z","message":{{"content":[{{"type":"text","text":"Done {i}"}}]}}}}"#
        ));
    }
    let path = project_dir.join(format!("{session_id}.jsonl"));
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}
