//! Retrieval: tokenize a free-text query, score indexed handoffs by keyword
//! IDF plus recency, and load the winners from the store.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use chrono::{NaiveDate, Utc};
use handoff_core::store::render_body;
use handoff_core::{Handoff, HandoffStore, StoreError};
use tracing::{debug, warn};

use crate::types::IndexState;
use crate::IndexEngine;

pub const DEFAULT_DAYS_BACK: u32 = 3;
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Hard cap on returned handoffs; larger requests are clamped.
pub const MAX_RESULTS_CAP: usize = 5;
pub const NO_RESULTS: &str = "No past sessions found.";

const STOPWORDS: &[&str] = &[
    "let", "lets", "let's", "continue", "work", "on", "the", "a", "an", "with", "to", "for", "of",
    "in", "and", "or", "is", "are", "was", "what", "how", "why", "when", "where", "do", "does",
    "did", "have", "has", "had", "be", "been", "being", "this", "that", "these", "those", "my",
    "your", "our", "their", "me", "you", "we", "they", "i", "about", "know", "think", "can",
    "could", "would", "should", "will", "shall", "all", "get", "show", "find", "search", "list",
    "give", "need", "want", "some", "any", "just", "more", "also", "very", "much", "here",
    "there",
];

/// Short tokens that still carry meaning.
const KNOWN_SHORT: &[&str] = &[
    "hr", "ai", "ml", "kb", "qa", "ui", "ux", "api", "cli", "os", "mcp", "llm", "gpu", "tg", "3d",
];

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("days_back must be at least 1, got {0}")]
    InvalidDaysBack(i64),

    #[error("max_results must be at least 1, got {0}")]
    InvalidMaxResults(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validated retrieval parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalQuery {
    text: Option<String>,
    days_back: u32,
    max_results: usize,
}

impl Default for RetrievalQuery {
    fn default() -> Self {
        Self {
            text: None,
            days_back: DEFAULT_DAYS_BACK,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl RetrievalQuery {
    /// Rejects `days_back < 1` and `max_results < 1`; clamps `max_results`
    /// to [`MAX_RESULTS_CAP`]. Blank text is treated as no text.
    pub fn new(
        text: Option<String>,
        days_back: i64,
        max_results: i64,
    ) -> Result<Self, QueryError> {
        if days_back < 1 {
            return Err(QueryError::InvalidDaysBack(days_back));
        }
        if max_results < 1 {
            return Err(QueryError::InvalidMaxResults(max_results));
        }
        Ok(Self {
            text: text.filter(|t| !t.trim().is_empty()),
            days_back: u32::try_from(days_back).unwrap_or(u32::MAX),
            max_results: usize::try_from(max_results)
                .unwrap_or(MAX_RESULTS_CAP)
                .min(MAX_RESULTS_CAP),
        })
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn days_back(&self) -> u32 {
        self.days_back
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }
}

/// Split `text` into distinct lowercase query terms, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    lower
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .filter(|w| w.len() >= 3 || KNOWN_SHORT.contains(w))
        .filter(|w| !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// `query` matches `term` exactly or as one segment of a hyphenated term.
fn term_matches(query: &str, term: &str) -> bool {
    term == query || (term.contains('-') && term.split('-').any(|seg| seg == query))
}

/// A scored candidate. `matched` is false for recency backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHandoff {
    pub session_id: String,
    pub date: NaiveDate,
    pub score: f64,
    pub matched: bool,
}

/// Age in days of `date` relative to `today`; future dates count as today.
fn age_days(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days().max(0)
}

fn by_date_desc(a: &RankedHandoff, b: &RankedHandoff) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| b.session_id.cmp(&a.session_id))
}

/// Rank every in-window, substantive handoff in `state`: keyword matches by
/// score first, then the remainder newest first.
pub fn rank(state: &IndexState, query: &RetrievalQuery, today: NaiveDate) -> Vec<RankedHandoff> {
    let days_back = i64::from(query.days_back());
    let in_window = |session_id: &str| {
        state.metadata(session_id).and_then(|meta| {
            let age = age_days(meta.date, today);
            (meta.substance.is_substantive() && age <= days_back).then_some((meta.date, age))
        })
    };

    let terms = query.text().map(tokenize).unwrap_or_default();
    let total = state.len() as f64;
    let mut scored: Vec<RankedHandoff> = Vec::new();

    if !terms.is_empty() {
        let mut keyword_scores: std::collections::BTreeMap<&str, f64> = Default::default();
        for query_term in &terms {
            let hits: BTreeSet<&str> = state
                .postings()
                .iter()
                .filter(|(term, _)| term_matches(query_term, term))
                .flat_map(|(_, ids)| ids.iter().map(String::as_str))
                .collect();
            if hits.is_empty() {
                continue;
            }
            let idf = (total / hits.len() as f64).ln().max(0.0);
            for id in hits {
                *keyword_scores.entry(id).or_insert(0.0) += idf;
            }
        }

        for (id, keyword_score) in keyword_scores {
            let Some((date, age)) = in_window(id) else {
                continue;
            };
            let recency = (1.0 - age as f64 / days_back as f64).max(0.0);
            scored.push(RankedHandoff {
                session_id: id.to_string(),
                date,
                score: keyword_score + recency,
                matched: true,
            });
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| by_date_desc(a, b)));
        debug!(terms = ?terms, matched = scored.len(), "keyword candidates scored");
    }

    let selected: HashSet<String> = scored.iter().map(|r| r.session_id.clone()).collect();
    let mut backfill: Vec<RankedHandoff> = state
        .handoffs()
        .keys()
        .filter(|id| !selected.contains(id.as_str()))
        .filter_map(|id| {
            in_window(id).map(|(date, _)| RankedHandoff {
                session_id: id.clone(),
                date,
                score: 0.0,
                matched: false,
            })
        })
        .collect();
    backfill.sort_by(by_date_desc);

    scored.extend(backfill);
    scored
}

/// Run `query` against the engine's current snapshot, relative to today (UTC).
pub fn query(
    engine: &IndexEngine,
    store: &HandoffStore,
    query: &RetrievalQuery,
) -> Result<Vec<Handoff>, QueryError> {
    query_at(engine, store, query, Utc::now().date_naive())
}

/// [`query`] with an explicit "today".
pub fn query_at(
    engine: &IndexEngine,
    store: &HandoffStore,
    query: &RetrievalQuery,
    today: NaiveDate,
) -> Result<Vec<Handoff>, QueryError> {
    let snapshot = engine.snapshot();
    let mut out = Vec::with_capacity(query.max_results());

    for ranked in rank(&snapshot, query, today) {
        if out.len() >= query.max_results() {
            break;
        }
        match store.load(&ranked.session_id, ranked.date) {
            Ok(handoff) => out.push(handoff),
            Err(e @ (StoreError::NotFound { .. } | StoreError::Malformed { .. })) => {
                warn!(session_id = %ranked.session_id, error = %e, "indexed handoff unavailable, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

/// Render retrieval output: a count header, then each body separated by `---`.
pub fn render_markdown(handoffs: &[Handoff]) -> String {
    if handoffs.is_empty() {
        return NO_RESULTS.to_string();
    }
    let count = handoffs.len();
    let plural = if count == 1 { "" } else { "s" };
    let bodies: Vec<String> = handoffs
        .iter()
        .map(|h| render_body(h).trim_end().to_string())
        .collect();
    format!(
        "## Handoffs: {count} past session{plural}\n\n{}\n",
        bodies.join("\n\n---\n\n")
    )
}
