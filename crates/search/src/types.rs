use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use handoff_core::{Handoff, Substance};
use serde::{Deserialize, Serialize};

/// Per-handoff data cached in the index, enough to score without the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub date: NaiveDate,
    pub headline: String,
    pub substance: Substance,
    /// Index terms, keywords first.
    pub terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mtime: Option<i64>,
}

impl IndexMetadata {
    pub fn from_handoff(handoff: &Handoff) -> Self {
        Self {
            date: handoff.date,
            headline: handoff.headline.clone(),
            substance: handoff.substance,
            terms: handoff.terms(),
            source_mtime: handoff.source_mtime,
        }
    }

    /// Ordering key used to pick the surviving version of a session.
    pub fn version_key(&self) -> (NaiveDate, i64) {
        (self.date, self.source_mtime.unwrap_or(i64::MIN))
    }
}

/// Term -> session ids.
pub type Postings = BTreeMap<String, BTreeSet<String>>;

/// One committed index state. Never mutated after it is published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    pub(crate) postings: Postings,
    pub(crate) handoffs: BTreeMap<String, IndexMetadata>,
}

impl IndexState {
    /// Build a state from handoffs in any order. When a session appears more
    /// than once the version with the greatest `(date, source_mtime)` wins.
    pub fn from_handoffs<'a>(handoffs: impl IntoIterator<Item = &'a Handoff>) -> Self {
        let mut latest: BTreeMap<String, IndexMetadata> = BTreeMap::new();
        for handoff in handoffs {
            let meta = IndexMetadata::from_handoff(handoff);
            let superseded = latest
                .get(&handoff.session_id)
                .is_some_and(|existing| existing.version_key() >= meta.version_key());
            if !superseded {
                latest.insert(handoff.session_id.clone(), meta);
            }
        }

        let mut state = IndexState::default();
        for (session_id, meta) in latest {
            state.insert(session_id, meta);
        }
        state
    }

    /// Replace everything known about `session_id` with `meta`.
    pub(crate) fn insert(&mut self, session_id: String, meta: IndexMetadata) {
        self.remove(&session_id);
        for term in &meta.terms {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(session_id.clone());
        }
        self.handoffs.insert(session_id, meta);
    }

    pub(crate) fn remove(&mut self, session_id: &str) {
        let Some(old) = self.handoffs.remove(session_id) else {
            return;
        };
        for term in &old.terms {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(session_id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
    }

    pub fn lookup(&self, term: &str) -> BTreeSet<String> {
        self.postings.get(term).cloned().unwrap_or_default()
    }

    pub fn metadata(&self, session_id: &str) -> Option<&IndexMetadata> {
        self.handoffs.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.handoffs.contains_key(session_id)
    }

    pub fn postings(&self) -> &Postings {
        &self.postings
    }

    pub fn handoffs(&self) -> &BTreeMap<String, IndexMetadata> {
        &self.handoffs
    }

    pub fn len(&self) -> usize {
        self.handoffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handoffs.is_empty()
    }
}

/// On-disk shape of the index file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub postings: Postings,
    pub handoffs: BTreeMap<String, IndexMetadata>,
}

/// Borrowing counterpart of [`IndexFile`] used when writing.
#[derive(Serialize)]
pub(crate) struct IndexFileRef<'a> {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub postings: &'a Postings,
    pub handoffs: &'a BTreeMap<String, IndexMetadata>,
}
