//! Inverted index and keyword-plus-recency retrieval over stored handoffs.
//!
//! # Architecture
//!
//! - **State**: [`IndexState`] maps term -> session ids and session id -> metadata
//! - **Write path**: `IndexEngine::upsert` / `IndexEngine::rebuild` -> persist -> swap snapshot
//! - **Read path**: `IndexEngine::snapshot` -> `query::rank` -> store load -> `query::render_markdown`
//! - **Storage**: a single JSON file (`handoff-index.json`), or in-memory for tests
//!
//! The handoff store is authoritative. The index can always be rebuilt from
//! it, so a corrupt or stale file is repaired rather than reported.

pub mod indexer;
pub mod query;
pub mod types;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use handoff_core::{HandoffStore, StoreError};
use tracing::{debug, info, warn};

pub use query::{query, query_at, render_markdown, tokenize, QueryError, RankedHandoff, RetrievalQuery};
pub use types::{IndexMetadata, IndexState, Postings};

use types::{IndexFile, IndexFileRef};

/// Format version of the index file. A mismatch triggers a rebuild.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("IO error on index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Lock-guarded index shared by the orchestrator, batch workers and queries.
///
/// Readers take an `Arc` snapshot and never hold a lock while scoring.
/// Writers serialize on `writer`, derive the next state from the current
/// snapshot, persist it and then publish it.
pub struct IndexEngine {
    /// `None` for in-memory engines.
    path: Option<PathBuf>,
    state: RwLock<Arc<IndexState>>,
    writer: Mutex<()>,
}

impl IndexEngine {
    /// Empty engine that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_state(None, IndexState::default())
    }

    /// In-memory engine built from every handoff in `store`.
    pub fn from_store(store: &HandoffStore) -> Result<Self, IndexError> {
        let handoffs = store.load_all()?;
        Ok(Self::with_state(None, IndexState::from_handoffs(&handoffs)))
    }

    /// Open the index persisted at `path`.
    ///
    /// A missing file is derived from the store. An unreadable, inconsistent or
    /// outdated file is rebuilt from the store and rewritten.
    pub fn open(path: &Path, store: &HandoffStore) -> Result<Self, IndexError> {
        let state = match load_index_file(path) {
            Ok(Some(state)) => {
                debug!(path = %path.display(), handoffs = state.len(), "index loaded");
                return Ok(Self::with_state(Some(path.to_path_buf()), state));
            }
            Ok(None) => {
                let state = IndexState::from_handoffs(&store.load_all()?);
                if state.is_empty() {
                    return Ok(Self::with_state(Some(path.to_path_buf()), state));
                }
                info!(path = %path.display(), handoffs = state.len(), "index missing, built from store");
                state
            }
            Err(e @ IndexError::Corrupt { .. }) => {
                warn!(error = %e, "rebuilding index from store");
                IndexState::from_handoffs(&store.load_all()?)
            }
            Err(e) => return Err(e),
        };

        let engine = Self::with_state(Some(path.to_path_buf()), IndexState::default());
        engine.commit(state);
        Ok(engine)
    }

    fn with_state(path: Option<PathBuf>, state: IndexState) -> Self {
        Self {
            path,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Last committed state. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<IndexState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lookup(&self, term: &str) -> std::collections::BTreeSet<String> {
        self.snapshot().lookup(term)
    }

    pub fn metadata(&self, session_id: &str) -> Option<IndexMetadata> {
        self.snapshot().metadata(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.snapshot().contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub(crate) fn lock_writer(&self) -> Result<MutexGuard<'_, ()>, IndexError> {
        self.writer.lock().map_err(|e| {
            warn!("index writer lock poisoned");
            IndexError::Io {
                path: self.path.clone().unwrap_or_default(),
                source: std::io::Error::other(format!("writer lock poisoned: {e}")),
            }
        })
    }

    /// Persist `next` (best effort) and publish it. Callers hold the writer lock.
    pub(crate) fn commit(&self, next: IndexState) {
        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &next) {
                warn!(error = %e, "failed to persist index");
            }
        }
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

/// Read an index file. `Ok(None)` when it does not exist.
pub fn load_index_file(path: &Path) -> Result<Option<IndexState>, IndexError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(IndexError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let file: IndexFile =
        serde_json::from_slice(&raw).map_err(|e| IndexError::corrupt(path, e.to_string()))?;
    if file.version != INDEX_FORMAT_VERSION {
        return Err(IndexError::corrupt(
            path,
            format!(
                "format version {} (expected {INDEX_FORMAT_VERSION})",
                file.version
            ),
        ));
    }

    let mut state = IndexState::default();
    for (session_id, meta) in file.handoffs {
        state.insert(session_id, meta);
    }
    if state.postings != file.postings {
        return Err(IndexError::corrupt(
            path,
            "postings disagree with handoff metadata",
        ));
    }
    Ok(Some(state))
}

/// Write `state` to `path` atomically (temp file + rename).
pub fn persist(path: &Path, state: &IndexState) -> Result<(), IndexError> {
    let io_err = |source: std::io::Error| IndexError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }

    let json = serde_json::to_vec_pretty(&IndexFileRef {
        version: INDEX_FORMAT_VERSION,
        updated_at: Utc::now(),
        postings: &state.postings,
        handoffs: &state.handoffs,
    })?;

    let tmp = path.with_extension("json.tmp");
    let result = std::fs::File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(&json)?;
            f.sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use handoff_core::{Handoff, HandoffBody, Substance};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn handoff(id: &str, keywords: &[&str]) -> Handoff {
        Handoff {
            session_id: id.into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            headline: format!("Session {id}"),
            projects: BTreeSet::from(["handoff".to_string()]),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            substance: Substance::MultiStep,
            body: HandoffBody::default(),
            source_mtime: Some(1_700_000_000),
            duration: None,
            model: None,
        }
    }

    #[test]
    fn test_open_missing_file_with_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path().join("handoffs"));
        let path = tmp.path().join("handoff-index.json");

        let engine = IndexEngine::open(&path, &store).unwrap();
        assert!(engine.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_persisted_index_reopens() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path().join("handoffs"));
        let path = tmp.path().join("handoff-index.json");

        let engine = IndexEngine::open(&path, &store).unwrap();
        engine.upsert(&handoff("a", &["routing", "index"])).unwrap();
        assert!(path.exists());

        // Store is empty: a successful reopen must come from the file.
        let reopened = IndexEngine::open(&path, &store).unwrap();
        assert_eq!(reopened.lookup("routing"), BTreeSet::from(["a".to_string()]));
        assert_eq!(reopened.snapshot(), engine.snapshot());
    }

    #[test]
    fn test_corrupt_file_rebuilt_from_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path().join("handoffs"));
        store.write(&handoff("a", &["routing"])).unwrap();
        let path = tmp.path().join("handoff-index.json");
        std::fs::write(&path, "{ not json").unwrap();

        let engine = IndexEngine::open(&path, &store).unwrap();
        assert_eq!(engine.lookup("routing"), BTreeSet::from(["a".to_string()]));
        assert_eq!(
            engine.snapshot().postings(),
            IndexEngine::from_store(&store).unwrap().snapshot().postings()
        );
        // File was rewritten with a valid index.
        assert!(load_index_file(&path).unwrap().is_some());
    }

    #[test]
    fn test_non_utf8_file_rebuilt_from_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path().join("handoffs"));
        store.write(&handoff("a", &["routing"])).unwrap();
        let path = tmp.path().join("handoff-index.json");
        std::fs::write(&path, b"{\xff\xfe\0").unwrap();

        assert!(matches!(
            load_index_file(&path),
            Err(IndexError::Corrupt { .. })
        ));
        let engine = IndexEngine::open(&path, &store).unwrap();
        assert_eq!(engine.lookup("routing"), BTreeSet::from(["a".to_string()]));
        assert!(load_index_file(&path).unwrap().is_some());
    }

    #[test]
    fn test_version_mismatch_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("handoff-index.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "updated_at": "2026-03-01T00:00:00Z", "postings": {}, "handoffs": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            load_index_file(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_inconsistent_postings_are_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("handoff-index.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "updated_at": "2026-03-01T00:00:00Z", "postings": {"ghost": ["x"]}, "handoffs": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            load_index_file(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_persist_failure_does_not_fail_upsert() {
        let tmp = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so every persist fails.
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let engine =
            IndexEngine::with_state(Some(blocker.join("handoff-index.json")), IndexState::default());

        engine.upsert(&handoff("a", &["routing"])).unwrap();
        assert!(engine.contains("a"));
    }
}
