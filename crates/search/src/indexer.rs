use std::time::Instant;

use handoff_core::{Handoff, HandoffStore};
use tracing::{debug, info};

use crate::types::{IndexMetadata, IndexState};
use crate::{IndexEngine, IndexError};

impl IndexEngine {
    /// Index one handoff, replacing any prior postings and metadata for its
    /// session id.
    pub fn upsert(&self, handoff: &Handoff) -> Result<(), IndexError> {
        self.upsert_many(std::slice::from_ref(handoff))
    }

    /// Index several handoffs as one mutation with a single flush.
    pub fn upsert_many(&self, handoffs: &[Handoff]) -> Result<(), IndexError> {
        if handoffs.is_empty() {
            return Ok(());
        }
        let _writer = self.lock_writer()?;

        let mut next = IndexState::clone(&self.snapshot());
        for handoff in handoffs {
            next.insert(
                handoff.session_id.clone(),
                IndexMetadata::from_handoff(handoff),
            );
        }
        self.commit(next);

        debug!(count = handoffs.len(), "handoffs indexed");
        Ok(())
    }

    /// Discard the current state and re-derive it from every handoff in
    /// `store`. Returns the number of indexed handoffs.
    pub fn rebuild(&self, store: &HandoffStore) -> Result<usize, IndexError> {
        let t0 = Instant::now();
        // Held across the scan so a concurrent upsert cannot be dropped.
        let _writer = self.lock_writer()?;
        let handoffs = store.load_all()?;
        let next = IndexState::from_handoffs(&handoffs);
        let count = next.len();
        self.commit(next);

        info!(
            handoffs = count,
            files = handoffs.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use handoff_core::{HandoffBody, Substance};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn handoff(id: &str, day: u32, keywords: &[&str]) -> Handoff {
        Handoff {
            session_id: id.into(),
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            headline: format!("Work on {id}"),
            projects: BTreeSet::from(["handoff".to_string()]),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            substance: Substance::SingleTask,
            body: HandoffBody::default(),
            source_mtime: None,
            duration: None,
            model: None,
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let engine = IndexEngine::in_memory();
        let h = handoff("a", 1, &["routing"]);
        engine.upsert(&h).unwrap();
        let first = engine.snapshot();
        engine.upsert(&h).unwrap();
        assert_eq!(*engine.snapshot(), *first);
    }

    #[test]
    fn test_upsert_leaves_no_stale_postings() {
        let engine = IndexEngine::in_memory();
        engine.upsert(&handoff("a", 1, &["routing", "index"])).unwrap();
        engine.upsert(&handoff("b", 1, &["index"])).unwrap();
        engine.upsert(&handoff("a", 2, &["batch"])).unwrap();

        assert!(engine.lookup("routing").is_empty());
        assert_eq!(engine.lookup("index"), BTreeSet::from(["b".to_string()]));
        assert_eq!(engine.lookup("batch"), BTreeSet::from(["a".to_string()]));
        assert_eq!(
            engine.metadata("a").unwrap().date,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_snapshot_unaffected_by_later_upsert() {
        let engine = IndexEngine::in_memory();
        engine.upsert(&handoff("a", 1, &["routing"])).unwrap();
        let before = engine.snapshot();
        engine.upsert(&handoff("b", 1, &["routing"])).unwrap();

        assert_eq!(before.lookup("routing").len(), 1);
        assert_eq!(engine.lookup("routing").len(), 2);
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path());
        let handoffs = [
            handoff("a", 1, &["routing", "index"]),
            handoff("b", 2, &["index"]),
            handoff("c", 3, &["batch", "routing"]),
        ];
        let incremental = IndexEngine::in_memory();
        for h in &handoffs {
            store.write(h).unwrap();
            incremental.upsert(h).unwrap();
        }

        let rebuilt = IndexEngine::in_memory();
        rebuilt.upsert(&handoff("stale", 1, &["gone"])).unwrap();
        assert_eq!(rebuilt.rebuild(&store).unwrap(), 3);

        assert_eq!(rebuilt.snapshot().postings(), incremental.snapshot().postings());
        assert!(!rebuilt.contains("stale"));
    }

    #[test]
    fn test_rebuild_keeps_later_dated_version() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HandoffStore::new(tmp.path());
        store.write(&handoff("a", 1, &["old-term"])).unwrap();
        store.write(&handoff("a", 5, &["new-term"])).unwrap();

        let engine = IndexEngine::from_store(&store).unwrap();
        assert_eq!(engine.len(), 1);
        assert!(engine.lookup("old-term").is_empty());
        assert_eq!(engine.lookup("new-term"), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_concurrent_upserts_all_land() {
        let engine = std::sync::Arc::new(IndexEngine::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    engine
                        .upsert(&handoff(&format!("s{i}"), 1, &["shared"]))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(engine.lookup("shared").len(), 8);
    }

    fn arb_handoffs() -> impl Strategy<Value = Vec<Handoff>> {
        let terms = prop::sample::subsequence(
            vec!["routing", "index", "batch", "resolver", "api", "session-routing"],
            1..=4,
        );
        prop::collection::vec((0u8..6, 1u32..28, terms), 1..12).prop_map(|items| {
            items
                .into_iter()
                .map(|(id, day, terms)| handoff(&format!("s{id}"), day, &terms))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_postings_independent_of_insertion_order(
            handoffs in arb_handoffs(),
            seed in any::<u64>(),
        ) {
            // Incremental upserts follow "last write wins"; rebuild picks the
            // latest (date, source_mtime). Feed both the same deduplicated set.
            let unique = IndexState::from_handoffs(&handoffs);
            let kept: Vec<Handoff> = handoffs
                .iter()
                .filter(|h| unique.metadata(&h.session_id) == Some(&IndexMetadata::from_handoff(h)))
                .cloned()
                .collect();

            let mut shuffled = kept.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            let a = IndexState::from_handoffs(&kept);
            let b = IndexState::from_handoffs(&shuffled);
            prop_assert_eq!(a.postings(), b.postings());
            prop_assert_eq!(a.postings(), unique.postings());

            let engine = IndexEngine::in_memory();
            for h in &shuffled {
                engine.upsert(h).unwrap();
            }
            let snap = engine.snapshot();
            prop_assert_eq!(snap.postings(), unique.postings());
        }
    }
}
