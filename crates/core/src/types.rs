// crates/core/src/types.rs
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How much real work a session contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Substance {
    /// No meaningful work (greetings, aborted starts, pure Q&A).
    Trivial = 0,
    /// A single task.
    SingleTask = 1,
    /// Multi-step work with real progress.
    MultiStep = 2,
}

impl Substance {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Substance >= 1 handoffs are the ones worth surfacing.
    pub fn is_substantive(self) -> bool {
        self >= Substance::SingleTask
    }
}

impl TryFrom<u8> for Substance {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Trivial),
            1 => Ok(Self::SingleTask),
            2 => Ok(Self::MultiStep),
            other => Err(format!("substance must be 0, 1 or 2, got {other}")),
        }
    }
}

impl TryFrom<i64> for Substance {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| format!("substance must be 0, 1 or 2, got {value}"))
            .and_then(Substance::try_from)
    }
}

impl From<Substance> for u8 {
    fn from(value: Substance) -> Self {
        value as u8
    }
}

impl fmt::Display for Substance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Structured free text of a handoff. Opaque to indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_happened: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_files: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_threads: Option<String>,
}

/// Persisted structured summary of one session.
///
/// Immutable once written: a re-extraction produces a new `Handoff` that
/// supersedes this one rather than editing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub session_id: String,
    /// Extraction day; also the storage partition (`YYYY/MM/DD`).
    pub date: NaiveDate,
    pub headline: String,
    pub projects: BTreeSet<String>,
    /// Routing terms, most relevant first.
    pub keywords: Vec<String>,
    pub substance: Substance,
    pub body: HandoffBody,
    /// Transcript mtime (unix milliseconds) at extraction; drives dedup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Handoff {
    /// Index terms for this handoff: keywords then projects, deduplicated.
    pub fn terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::with_capacity(self.keywords.len() + self.projects.len());
        for term in self.keywords.iter().chain(self.projects.iter()) {
            let term = term.to_lowercase();
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        terms
    }

    /// First 8 characters of the session id, used in user-facing messages.
    pub fn short_id(&self) -> &str {
        short_id(&self.session_id)
    }
}

/// First 8 characters of a session id (or the whole id if shorter).
pub fn short_id(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

/// A resolved pointer to exactly one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReference {
    /// Transcript file stem.
    pub session_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SessionReference {
    /// Modification time as unix milliseconds.
    pub fn modified_unix_ms(&self) -> i64 {
        unix_millis(self.modified)
    }
}

/// Convert a `SystemTime` into unix milliseconds (0 for pre-epoch times).
pub fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substance_bounds() {
        assert_eq!(Substance::try_from(2u8), Ok(Substance::MultiStep));
        assert!(Substance::try_from(3u8).is_err());
        assert!(Substance::try_from(-1i64).is_err());
        assert!(!Substance::Trivial.is_substantive());
        assert!(Substance::SingleTask.is_substantive());
    }

    #[test]
    fn test_substance_serde_as_integer() {
        let json = serde_json::to_string(&Substance::MultiStep).unwrap();
        assert_eq!(json, "2");
        let parsed: Result<Substance, _> = serde_json::from_str("7");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_terms_dedup_keywords_first() {
        let handoff = Handoff {
            session_id: "1b2f6f6b-65a6-42ff-aca7-34889b422799".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            headline: "Wire the router".into(),
            projects: ["routing".to_string(), "eywa".to_string()].into_iter().collect(),
            keywords: vec!["routing".into(), "Index".into()],
            substance: Substance::SingleTask,
            body: HandoffBody::default(),
            source_mtime: None,
            duration: None,
            model: None,
        };
        assert_eq!(handoff.terms(), vec!["routing", "index", "eywa"]);
        assert_eq!(handoff.short_id(), "1b2f6f6b");
    }

    #[test]
    fn test_short_id_handles_short_input() {
        assert_eq!(short_id("abc"), "abc");
    }
}
