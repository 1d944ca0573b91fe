// crates/core/src/store.rs
//! Handoff Store: one markdown document per handoff.
//!
//! Layout: `<root>/YYYY/MM/DD/<session_id>.md`. Each document has a front
//! matter header followed by the rendered body:
//!
//! ```text
//! ---
//! session_id: 1b2f6f6b-65a6-42ff-aca7-34889b422799
//! date: 2026-03-01
//! headline: "Router: wire the fallback chain"
//! projects: [eywa]
//! keywords: [session-routing, index]
//! substance: 2
//! source_mtime: 1772371200000
//! ---
//!
//! # Router: wire the fallback chain
//!
//! ## What Happened
//! ...
//! ```
//!
//! Writes are atomic (temp file, then rename). Files are never rewritten in
//! place by a later date's extraction; the newer version lands in its own
//! date partition.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::paths::date_partition;
use crate::types::{Handoff, HandoffBody, Substance};

const WHAT_HAPPENED: &str = "## What Happened";
const INSIGHTS: &str = "## Insights";
const KEY_FILES: &str = "## Key Files";
const OPEN_THREADS: &str = "## Open Threads";
const NO_MEANINGFUL_WORK: &str = "No meaningful work.";

/// Durable store rooted at the handoffs directory.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    root: PathBuf,
}

impl HandoffStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a handoff for `session_id` on `date` lives at.
    pub fn path_for(&self, session_id: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(date_partition(date))
            .join(format!("{session_id}.md"))
    }

    /// Persist a handoff atomically and return its path.
    pub fn write(&self, handoff: &Handoff) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&handoff.session_id, handoff.date);
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::malformed(&path, "handoff path has no parent"))?;
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let tmp = path.with_extension("md.tmp");
        let content = render_document(handoff);
        let result = std::fs::File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(content.as_bytes())?;
                f.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp, &path));
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::io(&path, e));
        }

        debug!(session_id = %handoff.session_id, path = ?path, "handoff written");
        Ok(path)
    }

    /// Read and parse one handoff file.
    pub fn read(&self, path: &Path) -> Result<Handoff, StoreError> {
        let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| StoreError::malformed(path, format!("not UTF-8: {e}")))?;
        parse_document(&raw).map_err(|message| StoreError::malformed(path, message))
    }

    /// Load the handoff for `session_id` stored under `date`.
    pub fn load(&self, session_id: &str, date: NaiveDate) -> Result<Handoff, StoreError> {
        self.read(&self.path_for(session_id, date))
    }

    /// Every `*.md` file under the root, sorted. A missing root is empty.
    pub fn list_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        collect_markdown(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }

    /// Every readable handoff in the store. Unreadable files are skipped with
    /// a warning so that one bad document cannot block a rebuild.
    pub fn load_all(&self) -> Result<Vec<Handoff>, StoreError> {
        let paths = self.list_paths()?;
        let mut handoffs = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read(&path) {
                Ok(h) => handoffs.push(h),
                Err(e) => warn!(path = ?path, error = %e, "skipping unreadable handoff"),
            }
        }
        Ok(handoffs)
    }
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            collect_markdown(&path, out)?;
        } else if file_type.is_file() && path.extension().map(|e| e == "md").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}

/// Render a full document: front matter plus body.
pub fn render_document(handoff: &Handoff) -> String {
    let mut lines = vec!["---".to_string()];
    lines.push(format!("session_id: {}", handoff.session_id));
    lines.push(format!("date: {}", handoff.date.format("%Y-%m-%d")));
    if let Some(duration) = handoff.duration.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("duration: {}", yaml_quote(duration)));
    }
    if let Some(model) = handoff.model.as_deref().filter(|m| !m.is_empty()) {
        lines.push(format!("model: {}", yaml_quote(model)));
    }
    lines.push(format!("headline: {}", yaml_quote(&handoff.headline)));
    lines.push(format!("projects: [{}]", join_terms(handoff.projects.iter())));
    lines.push(format!("keywords: [{}]", join_terms(handoff.keywords.iter())));
    lines.push(format!("substance: {}", handoff.substance));
    if let Some(mtime) = handoff.source_mtime {
        lines.push(format!("source_mtime: {mtime}"));
    }
    lines.push("---".to_string());
    lines.push(String::new());

    let mut doc = lines.join("\n");
    doc.push_str(&render_body(handoff));
    doc
}

/// Render the body only (no front matter), as shown to retrieval callers.
pub fn render_body(handoff: &Handoff) -> String {
    let mut lines = vec![format!("# {}", handoff.headline)];

    if handoff.substance == Substance::Trivial {
        lines.extend([String::new(), NO_MEANINGFUL_WORK.to_string()]);
    } else {
        let body = &handoff.body;
        let sections = [
            (WHAT_HAPPENED, body.what_happened.as_deref()),
            (INSIGHTS, body.insights.as_deref()),
            (
                KEY_FILES,
                body.key_files
                    .as_deref()
                    .filter(|_| handoff.substance == Substance::MultiStep),
            ),
            (OPEN_THREADS, body.open_threads.as_deref()),
        ];
        for (heading, text) in sections {
            if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
                lines.extend([String::new(), heading.to_string(), text.to_string()]);
            }
        }
    }

    let mut out = lines.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

fn join_terms<'a>(terms: impl Iterator<Item = &'a String>) -> String {
    terms.map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Quote a front matter scalar when it contains YAML-special characters.
pub fn yaml_quote(value: &str) -> String {
    const SPECIAL: [char; 16] = [
        ':', '<', '>', '{', '}', '[', ']', '#', '&', '*', '!', '|', '"', '\'', '%', '@',
    ];
    let needs_quoting = value.is_empty()
        || value.contains(SPECIAL)
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quoting {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

fn yaml_unquote(raw: &str) -> String {
    let raw = raw.trim();
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .filter(|_| raw.len() >= 2)
    else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);
    inner
        .split(',')
        .map(|item| yaml_unquote(item))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Split a document into its front matter lines and body.
fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n"))?;
    let end = rest.find("\n---")?;
    let header = &rest[..end];
    let after = &rest[end + 4..];
    let body = after
        .strip_prefix("\r\n")
        .or_else(|| after.strip_prefix('\n'))
        .unwrap_or(after);
    Some((header, body))
}

/// Parse a stored document back into a [`Handoff`].
pub fn parse_document(raw: &str) -> Result<Handoff, String> {
    let (header, body) = split_front_matter(raw).ok_or("missing front matter")?;

    let mut session_id = None;
    let mut date = None;
    let mut headline = None;
    let mut projects = BTreeSet::new();
    let mut keywords = Vec::new();
    let mut substance = None;
    let mut source_mtime = None;
    let mut duration = None;
    let mut model = None;

    for line in header.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "session_id" => session_id = Some(yaml_unquote(value)),
            "date" => {
                let text = yaml_unquote(value);
                date = Some(
                    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                        .map_err(|_| format!("invalid date: {text:?}"))?,
                );
            }
            "headline" => headline = Some(yaml_unquote(value)),
            "projects" => projects = parse_list(value).into_iter().collect(),
            "keywords" => keywords = parse_list(value),
            "substance" => {
                let n: i64 = value
                    .parse()
                    .map_err(|_| format!("invalid substance: {value:?}"))?;
                substance = Some(Substance::try_from(n)?);
            }
            "source_mtime" => source_mtime = value.parse::<i64>().ok(),
            "duration" => duration = Some(yaml_unquote(value)),
            "model" => model = Some(yaml_unquote(value)),
            _ => {}
        }
    }

    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or("missing session_id")?;
    Ok(Handoff {
        session_id,
        date: date.ok_or("missing date")?,
        headline: headline.ok_or("missing headline")?,
        projects,
        keywords,
        substance: substance.ok_or("missing substance")?,
        body: parse_body(body),
        source_mtime,
        duration,
        model,
    })
}

fn parse_body(body: &str) -> HandoffBody {
    const HEADINGS: [&str; 4] = [WHAT_HAPPENED, INSIGHTS, KEY_FILES, OPEN_THREADS];
    let mut sections: [Vec<&str>; 4] = Default::default();
    let mut current: Option<usize> = None;

    for line in body.lines() {
        if let Some(idx) = HEADINGS.iter().position(|h| *h == line.trim_end()) {
            current = Some(idx);
        } else if let Some(idx) = current {
            sections[idx].push(line);
        }
    }

    let [what_happened, insights, key_files, open_threads] = sections.map(|lines| {
        let text = lines.join("\n").trim().to_string();
        (!text.is_empty()).then_some(text)
    });
    HandoffBody {
        what_happened,
        insights,
        key_files,
        open_threads,
    }
}
