// crates/core/src/normalize.rs
//! Transcript normalization: raw JSONL to canonical markdown text.

use std::path::Path;

use serde_json::Value;

use crate::error::NormalizeError;

/// Turns a raw transcript file into the text an extractor reads.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, path: &Path) -> Result<String, NormalizeError>;
}

/// Default normalizer for Claude Code JSONL transcripts.
///
/// Output is a sequence of `## User` / `## Assistant` sections. Tool calls are
/// summarized as `` `tool: Name` `` lines; tool results, sidechain (subagent)
/// lines and meta lines are dropped. Consecutive blocks from the same role
/// share one section.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

impl Role {
    fn heading(self) -> &'static str {
        match self {
            Role::User => "## User",
            Role::Assistant => "## Assistant",
        }
    }
}

impl Normalizer for JsonlNormalizer {
    fn normalize(&self, path: &Path) -> Result<String, NormalizeError> {
        let raw = std::fs::read_to_string(path).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = normalize_jsonl(&raw);
        if text.is_empty() {
            return Err(NormalizeError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(text)
    }
}

/// Normalize JSONL text. Unparseable lines are skipped.
pub fn normalize_jsonl(raw: &str) -> String {
    let mut out = String::new();
    let mut current: Option<Role> = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if flag(&value, "isSidechain") || flag(&value, "isMeta") {
            continue;
        }
        let role = match value.get("type").and_then(Value::as_str) {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let Some(content) = value.get("message").and_then(|m| m.get("content")) else {
            continue;
        };

        let blocks = content_blocks(content);
        if blocks.is_empty() {
            continue;
        }

        if current != Some(role) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(role.heading());
            current = Some(role);
        }
        for block in blocks {
            out.push_str("\n\n");
            out.push_str(&block);
        }
    }

    out
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn content_blocks(content: &Value) -> Vec<String> {
    match content {
        Value::String(s) => text_block(s).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.get("type").and_then(Value::as_str) {
                Some("text") => item.get("text").and_then(Value::as_str).and_then(text_block),
                Some("tool_use") => item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|name| format!("`tool: {name}`")),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn text_block(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
