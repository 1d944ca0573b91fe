// crates/core/src/llm/schema.rs
//! Fixed handoff output schema: prompt, JSON schema, response parsing and
//! validation shared by every [`Extractor`](super::Extractor).

use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::types::{ExtractError, ExtractedHandoff};
use crate::types::{Handoff, HandoffBody, Substance};

pub const MIN_HEADLINE_CHARS: usize = 5;
pub const MAX_KEYWORDS: usize = 7;
pub const RECOMMENDED_MIN_KEYWORDS: usize = 5;

const SYSTEM_PROMPT: &str = r#"You write handoff notes between coding sessions. Output ONLY a JSON object, no other text.

Read the session transcript and summarize it for the next session that picks up this work.

Fields:
- headline: one line, what this session was about (at least 5 characters)
- projects: project names touched, lowercase-hyphenated
- keywords: 5-7 routing terms, lowercase-hyphenated, most relevant first
- substance: 0 = no real work (greetings, aborted start, pure Q&A), 1 = a single task, 2 = multi-step work with real progress
- what_happened: short paragraph or bullets
- insights: decisions, gotchas, things learned
- key_files: important files touched (only for substance 2)
- open_threads: unfinished work and next steps
- duration: rough session length, e.g. "45m" (optional)"#;

/// Build the full extraction prompt for one transcript.
pub fn build_extraction_prompt(transcript: &str, project_hint: Option<&str>) -> String {
    let mut prompt = String::with_capacity(SYSTEM_PROMPT.len() + transcript.len() + 64);
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n\n");
    if let Some(project) = project_hint.filter(|p| !p.is_empty()) {
        prompt.push_str("Working directory project: ");
        prompt.push_str(project);
        prompt.push_str("\n\n");
    }
    prompt.push_str("<transcript>\n");
    prompt.push_str(transcript);
    prompt.push_str("\n</transcript>");
    prompt
}

/// JSON schema sent to providers that support structured output.
pub fn handoff_json_schema() -> serde_json::Value {
    let text = serde_json::json!({ "type": "string" });
    let terms = serde_json::json!({ "type": "array", "items": { "type": "string" } });
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["headline", "projects", "keywords", "substance", "what_happened", "insights", "key_files", "open_threads"],
        "properties": {
            "headline": { "type": "string", "minLength": MIN_HEADLINE_CHARS },
            "projects": terms,
            "keywords": { "type": "array", "items": { "type": "string" }, "minItems": 1, "maxItems": MAX_KEYWORDS },
            "substance": { "type": "integer", "enum": [0, 1, 2] },
            "what_happened": text,
            "insights": text,
            "key_files": text,
            "open_threads": text,
            "duration": text
        }
    })
}

/// Parse a provider's textual answer into an [`ExtractedHandoff`].
///
/// Accepts a bare JSON object, the CLI wrapper `{"result": "<json text>"}`,
/// and JSON embedded in surrounding prose or a markdown fence.
pub fn parse_response(text: &str) -> Result<ExtractedHandoff, ExtractError> {
    let value = parse_json_loose(text).ok_or_else(|| {
        ExtractError::ProviderError(format!(
            "no JSON object found in response: {}",
            truncate(text, 200)
        ))
    })?;

    let inner = match value.get("result").and_then(|v| v.as_str()) {
        Some(result_str) => parse_json_loose(result_str).ok_or_else(|| {
            ExtractError::ProviderError(format!(
                "no JSON object found in CLI result: {}",
                truncate(result_str, 200)
            ))
        })?,
        None => value,
    };

    if !inner.is_object() {
        return Err(ExtractError::ValidationFailed(
            "response is not a JSON object".into(),
        ));
    }
    serde_json::from_value(inner)
        .map_err(|e| ExtractError::ValidationFailed(format!("response has wrong field types: {e}")))
}

fn parse_json_loose(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(text.trim())
        .ok()
        .or_else(|| extract_json_from_text(text))
}

/// Extract the first balanced `{...}` block from `text`, skipping braces
/// inside string literals.
pub fn extract_json_from_text(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    serde_json::from_str(&text[start..end?]).ok()
}

/// A provider answer that passed validation, not yet stamped with identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedExtraction {
    pub headline: String,
    pub projects: BTreeSet<String>,
    pub keywords: Vec<String>,
    pub substance: Substance,
    pub body: HandoffBody,
    pub duration: Option<String>,
}

impl ValidatedExtraction {
    /// Stamp identity and provenance, producing a storable [`Handoff`].
    pub fn into_handoff(
        self,
        session_id: impl Into<String>,
        date: NaiveDate,
        source_mtime: Option<i64>,
        model: Option<String>,
    ) -> Handoff {
        Handoff {
            session_id: session_id.into(),
            date,
            headline: self.headline,
            projects: self.projects,
            keywords: self.keywords,
            substance: self.substance,
            body: self.body,
            source_mtime,
            duration: self.duration,
            model,
        }
    }
}

/// Validate and normalize a raw provider answer.
pub fn validate_extraction(raw: ExtractedHandoff) -> Result<ValidatedExtraction, ExtractError> {
    let headline = raw
        .headline
        .as_deref()
        .map(|h| h.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if headline.chars().count() < MIN_HEADLINE_CHARS {
        return Err(ExtractError::ValidationFailed(format!(
            "headline too short: {headline:?}"
        )));
    }

    let substance = match &raw.substance {
        Some(value) => parse_substance(value)?,
        None => {
            return Err(ExtractError::ValidationFailed(
                "missing substance".into(),
            ))
        }
    };

    if let Some(date) = raw.date.as_deref().filter(|d| !d.trim().is_empty()) {
        NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ExtractError::ValidationFailed(format!("invalid date: {date:?}")))?;
    }

    let mut keywords = normalize_terms(&raw.keywords);
    if keywords.is_empty() {
        return Err(ExtractError::ValidationFailed("no keywords".into()));
    }
    if keywords.len() > MAX_KEYWORDS {
        tracing::debug!(count = keywords.len(), "truncating keywords");
        keywords.truncate(MAX_KEYWORDS);
    }
    if keywords.len() < RECOMMENDED_MIN_KEYWORDS {
        tracing::warn!(count = keywords.len(), "extraction returned few keywords");
    }

    let projects = normalize_terms(&raw.projects).into_iter().collect();

    // Keep only the sections the stored document renders, so a handoff reads
    // back exactly as it was returned.
    let body = match substance {
        Substance::Trivial => HandoffBody::default(),
        Substance::SingleTask => HandoffBody {
            what_happened: non_empty(raw.what_happened),
            insights: non_empty(raw.insights),
            key_files: None,
            open_threads: non_empty(raw.open_threads),
        },
        Substance::MultiStep => HandoffBody {
            what_happened: non_empty(raw.what_happened),
            insights: non_empty(raw.insights),
            key_files: non_empty(raw.key_files),
            open_threads: non_empty(raw.open_threads),
        },
    };

    Ok(ValidatedExtraction {
        headline,
        projects,
        keywords,
        substance,
        body,
        duration: non_empty(raw.duration),
    })
}

fn parse_substance(value: &serde_json::Value) -> Result<Substance, ExtractError> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    number
        .ok_or_else(|| format!("invalid substance: {value}"))
        .and_then(Substance::try_from)
        .map_err(ExtractError::ValidationFailed)
}

/// Normalize routing terms: lowercase, whitespace runs to `-`, deduplicated in order.
///
/// Characters that would break the front matter list syntax are treated as
/// whitespace.
pub fn normalize_terms(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for term in raw {
        let term = term
            .to_lowercase()
            .replace([',', '[', ']', '"', '\'', ':', '#'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        let term = term.trim_matches('-').to_string();
        if !term.is_empty() && !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
