// crates/core/src/resolver.rs
//! Session resolution: find the one transcript that is "the current session".
//!
//! An explicit id is looked up directly with no fallback. Without one, an
//! ordered chain of strategies is tried and the first that yields exactly one
//! fresh transcript wins:
//!
//! 1. process lineage (an ancestor holds a file open under the tasks dir)
//! 2. working-directory recency (freshest transcript in the cwd's project dir)
//! 3. global recency (freshest transcript in any project dir)
//!
//! Everything here is read-only: `read_dir`, `stat` and process inspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::config::HandoffConfig;
use crate::discovery::{self, TranscriptFile};
use crate::error::ResolveError;
use crate::process::{self, ProcessInspector, SystemProcessInspector};
use crate::types::SessionReference;

/// A heuristic match must have been modified at most this long ago.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);
/// The freshest candidate must lead the runner-up by more than this.
pub const AMBIGUITY_GAP: Duration = Duration::from_secs(2);
/// Shortest accepted explicit id prefix.
pub const MIN_PREFIX_LEN: usize = 8;

impl From<TranscriptFile> for SessionReference {
    fn from(file: TranscriptFile) -> Self {
        Self {
            session_id: file.session_id,
            path: file.path,
            modified: file.modified,
        }
    }
}

/// Inputs shared by every strategy during one resolution.
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    pub sessions_dir: &'a Path,
    pub tasks_dir: &'a Path,
    pub cwd: &'a Path,
    pub now: SystemTime,
}

/// One link of the fallback chain. Yields a reference or skips.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, ctx: &ResolveContext<'_>) -> Option<SessionReference>;
}

/// Resolves a session reference from an optional explicit id.
pub struct SessionResolver {
    sessions_dir: PathBuf,
    tasks_dir: PathBuf,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl SessionResolver {
    pub fn new(sessions_dir: impl Into<PathBuf>, tasks_dir: impl Into<PathBuf>) -> Self {
        Self::with_inspector(sessions_dir, tasks_dir, Arc::new(SystemProcessInspector))
    }

    pub fn from_config(config: &HandoffConfig) -> Self {
        Self::new(&config.sessions_dir, &config.tasks_dir)
    }

    /// Build a resolver that inspects processes through `inspector`.
    pub fn with_inspector(
        sessions_dir: impl Into<PathBuf>,
        tasks_dir: impl Into<PathBuf>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            tasks_dir: tasks_dir.into(),
            strategies: vec![
                Box::new(ProcessLineage { inspector }),
                Box::new(WorkingDirectoryRecency),
                Box::new(GlobalRecency),
            ],
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Resolve using the process cwd and the current time.
    pub fn resolve(&self, explicit_id: Option<&str>) -> Result<SessionReference, ResolveError> {
        let cwd = std::env::current_dir().unwrap_or_default();
        self.resolve_at(explicit_id, &cwd, SystemTime::now())
    }

    /// Resolve against an explicit working directory and clock.
    pub fn resolve_at(
        &self,
        explicit_id: Option<&str>,
        cwd: &Path,
        now: SystemTime,
    ) -> Result<SessionReference, ResolveError> {
        if let Some(id) = explicit_id.map(str::trim).filter(|id| !id.is_empty()) {
            return resolve_explicit(&self.sessions_dir, id);
        }

        let ctx = ResolveContext {
            sessions_dir: &self.sessions_dir,
            tasks_dir: &self.tasks_dir,
            cwd,
            now,
        };
        for strategy in &self.strategies {
            if let Some(found) = strategy.attempt(&ctx) {
                debug!(strategy = strategy.name(), session_id = %found.session_id, "session resolved");
                return Ok(found);
            }
            debug!(strategy = strategy.name(), "strategy skipped");
        }

        Err(ResolveError::not_found(format!(
            "no single transcript modified within {}s (process lineage, working directory and global recency all skipped)",
            FRESHNESS_WINDOW.as_secs()
        )))
    }
}

/// Look up a full session UUID or an unambiguous hex prefix.
pub fn resolve_explicit(sessions_dir: &Path, id: &str) -> Result<SessionReference, ResolveError> {
    if !sessions_dir.is_dir() {
        return Err(ResolveError::ProjectsDirNotFound {
            path: sessions_dir.to_path_buf(),
        });
    }
    let dirs = discovery::project_dirs(sessions_dir)
        .map_err(|e| ResolveError::not_found(e.to_string()))?;

    if discovery::is_uuid(id) {
        let file_name = format!("{id}.jsonl");
        return dirs
            .iter()
            .flat_map(|dir| discovery::list_transcripts(dir))
            .find(|t| t.path.file_name().map(|n| n == file_name.as_str()).unwrap_or(false))
            .map(SessionReference::from)
            .ok_or_else(|| ResolveError::not_found(format!("session {id} not in any project directory")));
    }

    if !id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-') {
        return Err(ResolveError::InvalidId {
            id: id.to_string(),
            reason: "expected a session UUID or lowercase hex prefix".into(),
        });
    }
    if id.len() < MIN_PREFIX_LEN {
        return Err(ResolveError::InvalidId {
            id: id.to_string(),
            reason: format!("prefix must be at least {MIN_PREFIX_LEN} characters"),
        });
    }

    let mut matches: Vec<TranscriptFile> = dirs
        .iter()
        .flat_map(|dir| discovery::list_transcripts(dir))
        .filter(|t| t.session_id.starts_with(id))
        .collect();
    match matches.len() {
        0 => Err(ResolveError::not_found(format!(
            "session {id} not in any project directory"
        ))),
        1 => Ok(matches.remove(0).into()),
        count => Err(ResolveError::Ambiguous {
            id: id.to_string(),
            count,
        }),
    }
}

/// Pick the single freshest candidate inside the freshness window.
///
/// Returns a skip reason when nothing is fresh, or when two candidates are
/// too close to call (parallel sessions).
pub fn freshest(
    candidates: Vec<TranscriptFile>,
    now: SystemTime,
) -> Result<TranscriptFile, String> {
    if candidates.is_empty() {
        return Err("no transcripts".into());
    }
    let mut fresh: Vec<TranscriptFile> = candidates
        .into_iter()
        .filter(|t| age(t.modified, now) <= FRESHNESS_WINDOW)
        .collect();
    fresh.sort_by(|a, b| b.modified.cmp(&a.modified));

    match fresh.len() {
        0 => Err(format!(
            "no transcript modified within {}s",
            FRESHNESS_WINDOW.as_secs()
        )),
        1 => Ok(fresh.remove(0)),
        n => {
            let lead = fresh[0]
                .modified
                .duration_since(fresh[1].modified)
                .unwrap_or_default();
            if lead > AMBIGUITY_GAP {
                Ok(fresh.remove(0))
            } else {
                Err(format!(
                    "ambiguous: {n} transcripts modified within {}s (parallel sessions?)",
                    FRESHNESS_WINDOW.as_secs()
                ))
            }
        }
    }
}

fn age(modified: SystemTime, now: SystemTime) -> Duration {
    // Future mtimes count as brand new.
    now.duration_since(modified).unwrap_or_default()
}

fn is_fresh(reference: &SessionReference, now: SystemTime) -> bool {
    age(reference.modified, now) <= FRESHNESS_WINDOW
}

/// Strategy 1: an ancestor process holds a file open under the tasks dir.
struct ProcessLineage {
    inspector: Arc<dyn ProcessInspector>,
}

impl ProcessLineage {
    fn traced_session_id(&self, tasks_dir: &Path) -> Option<String> {
        let mut roots = vec![tasks_dir.to_path_buf()];
        if let Ok(canonical) = tasks_dir.canonicalize() {
            if canonical != tasks_dir {
                roots.push(canonical);
            }
        }

        self.inspector.ancestors().into_iter().find_map(|pid| {
            self.inspector
                .open_files(pid)
                .iter()
                .find_map(|path| roots.iter().find_map(|root| process::task_session_id(path, root)))
        })
    }
}

impl ResolveStrategy for ProcessLineage {
    fn name(&self) -> &'static str {
        "process_lineage"
    }

    fn attempt(&self, ctx: &ResolveContext<'_>) -> Option<SessionReference> {
        let Some(session_id) = self.traced_session_id(ctx.tasks_dir) else {
            debug!("no tasks file open in ancestor processes");
            return None;
        };
        match resolve_explicit(ctx.sessions_dir, &session_id) {
            Ok(found) if is_fresh(&found, ctx.now) => Some(found),
            Ok(_) => {
                debug!(%session_id, "traced transcript is stale");
                None
            }
            Err(e) => {
                debug!(%session_id, error = %e, "traced session has no transcript");
                None
            }
        }
    }
}

/// Strategy 2: freshest transcript in the project dir derived from the cwd.
struct WorkingDirectoryRecency;

impl ResolveStrategy for WorkingDirectoryRecency {
    fn name(&self) -> &'static str {
        "working_directory"
    }

    fn attempt(&self, ctx: &ResolveContext<'_>) -> Option<SessionReference> {
        let project_dir = ctx
            .sessions_dir
            .join(discovery::encode_project_dir(ctx.cwd));
        let is_real_dir = std::fs::symlink_metadata(&project_dir)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_real_dir {
            debug!(dir = ?project_dir, "no project dir for cwd");
            return None;
        }
        freshest(discovery::list_transcripts(&project_dir), ctx.now)
            .map_err(|reason| debug!(%reason, "working directory skipped"))
            .ok()
            .map(SessionReference::from)
    }
}

/// Strategy 3: freshest transcript across every project dir.
struct GlobalRecency;

impl ResolveStrategy for GlobalRecency {
    fn name(&self) -> &'static str {
        "global_recency"
    }

    fn attempt(&self, ctx: &ResolveContext<'_>) -> Option<SessionReference> {
        let corpus = match discovery::scan_corpus(ctx.sessions_dir) {
            Ok(corpus) => corpus,
            Err(e) => {
                debug!(error = %e, "cannot scan transcripts");
                return None;
            }
        };
        freshest(corpus, ctx.now)
            .map_err(|reason| debug!(%reason, "global recency skipped"))
            .ok()
            .map(SessionReference::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const A: &str = "aaaaaaaa-1111-4111-8111-111111111111";
    const B: &str = "bbbbbbbb-2222-4222-8222-222222222222";
    const C: &str = "cccccccc-3333-4333-8333-333333333333";

    struct FakeInspector {
        open: Vec<PathBuf>,
    }

    impl ProcessInspector for FakeInspector {
        fn ancestors(&self) -> Vec<u32> {
            vec![4242]
        }
        fn open_files(&self, pid: u32) -> Vec<PathBuf> {
            if pid == 4242 {
                self.open.clone()
            } else {
                Vec::new()
            }
        }
    }

    struct Fixture {
        tmp: TempDir,
        now: SystemTime,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            std::fs::create_dir_all(tmp.path().join("projects")).unwrap();
            std::fs::create_dir_all(tmp.path().join("tasks")).unwrap();
            Self {
                tmp,
                now: SystemTime::now(),
            }
        }

        fn sessions(&self) -> PathBuf {
            self.tmp.path().join("projects")
        }

        fn tasks(&self) -> PathBuf {
            self.tmp.path().join("tasks")
        }

        /// Write a transcript modified `age_secs` before `now`.
        fn transcript(&self, project: &str, id: &str, age_secs: u64) -> PathBuf {
            let dir = self.sessions().join(project);
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(format!("{id}.jsonl"));
            std::fs::write(&path, b"{}\n").unwrap();
            let file = File::options().write(true).open(&path).unwrap();
            file.set_modified(self.now - Duration::from_secs(age_secs))
                .unwrap();
            path
        }

        fn resolver(&self, open: Vec<PathBuf>) -> SessionResolver {
            SessionResolver::with_inspector(
                self.sessions(),
                self.tasks(),
                Arc::new(FakeInspector { open }),
            )
        }
    }

    #[test]
    fn test_explicit_full_uuid() {
        let fx = Fixture::new();
        let path = fx.transcript("-p", A, 3600);
        let found = fx
            .resolver(vec![])
            .resolve_at(Some(A), Path::new("/elsewhere"), fx.now)
            .unwrap();
        assert_eq!(found.path, path);
        assert_eq!(found.session_id, A);
    }

    #[test]
    fn test_explicit_prefix_and_ambiguity() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 10);
        fx.transcript("-q", "aaaaaaaa-9999-4999-8999-999999999999", 10);
        fx.transcript("-q", B, 10);
        let resolver = fx.resolver(vec![]);

        let found = resolver.resolve_at(Some("bbbbbbbb"), Path::new("/"), fx.now).unwrap();
        assert_eq!(found.session_id, B);

        let err = resolver.resolve_at(Some("aaaaaaaa"), Path::new("/"), fx.now).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { count: 2, .. }));

        let err = resolver.resolve_at(Some("dddddddd"), Path::new("/"), fx.now).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_explicit_short_or_malformed_is_invalid() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 10);
        let resolver = fx.resolver(vec![]);

        let err = resolver.resolve_at(Some("aaaa"), Path::new("/"), fx.now).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidId { .. }));

        let err = resolver.resolve_at(Some("../etc/passwd"), Path::new("/"), fx.now).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidId { .. }));
    }

    #[test]
    fn test_explicit_never_falls_back() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 1);
        let err = fx
            .resolver(vec![])
            .resolve_at(Some(B), Path::new("/"), fx.now)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
        assert!(err.to_string().contains("explicit session id"));
    }

    #[test]
    fn test_process_lineage_wins_first() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 20);
        fx.transcript("-q", B, 1);
        let open = vec![fx.tasks().join(A).join("lock")];

        let found = fx
            .resolver(open)
            .resolve_at(None, Path::new("/q"), fx.now)
            .unwrap();
        assert_eq!(found.session_id, A);
    }

    #[test]
    fn test_working_directory_strategy() {
        let fx = Fixture::new();
        let cwd = Path::new("/home/u/my.app");
        fx.transcript("-home-u-my-app", A, 10);
        fx.transcript("-home-u-my-app", C, 25);
        // Fresher, but in another project.
        fx.transcript("-other", B, 1);

        let found = fx.resolver(vec![]).resolve_at(None, cwd, fx.now).unwrap();
        assert_eq!(found.session_id, A);
    }

    #[test]
    fn test_falls_through_to_global_recency() {
        let fx = Fixture::new();
        let cwd = Path::new("/home/u/proj");
        // Lineage points at a stale transcript, the cwd project is stale too.
        fx.transcript("-old", A, 120);
        fx.transcript("-home-u-proj", C, 90);
        fx.transcript("-elsewhere", B, 5);
        let open = vec![fx.tasks().join(A).join("lock")];

        let found = fx.resolver(open).resolve_at(None, cwd, fx.now).unwrap();
        assert_eq!(found.session_id, B);
    }

    #[test]
    fn test_parallel_sessions_are_ambiguous() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 3);
        fx.transcript("-q", B, 4);

        let err = fx
            .resolver(vec![])
            .resolve_at(None, Path::new("/none"), fx.now)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_clear_leader_beats_runner_up() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 2);
        fx.transcript("-q", B, 10);

        let found = fx
            .resolver(vec![])
            .resolve_at(None, Path::new("/none"), fx.now)
            .unwrap();
        assert_eq!(found.session_id, A);
    }

    #[test]
    fn test_everything_stale_is_not_found() {
        let fx = Fixture::new();
        fx.transcript("-p", A, 600);
        let err = fx
            .resolver(vec![])
            .resolve_at(None, Path::new("/none"), fx.now)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_missing_sessions_dir() {
        let tmp = TempDir::new().unwrap();
        let resolver = SessionResolver::with_inspector(
            tmp.path().join("nope"),
            tmp.path().join("tasks"),
            Arc::new(FakeInspector { open: vec![] }),
        );
        let err = resolver
            .resolve_at(Some(A), Path::new("/"), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, ResolveError::ProjectsDirNotFound { .. }));

        let err = resolver
            .resolve_at(None, Path::new("/"), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }
}
