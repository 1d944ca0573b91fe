// crates/core/src/discovery.rs
//! Transcript discovery for Claude Code sessions.
//!
//! Claude Code keeps one `<session-uuid>.jsonl` transcript per session inside a
//! per-project directory whose name is the escaped working directory:
//!
//! ```text
//! sessions_dir/
//!   -Users-foo-my-project/
//!     1b2f6f6b-65a6-42ff-aca7-34889b422799.jsonl
//! ```
//!
//! Everything here is read-only (`read_dir` + `stat`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::DiscoveryError;

/// One transcript file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFile {
    /// File stem, normally a session UUID.
    pub session_id: String,
    pub path: PathBuf,
    /// Escaped project directory name (e.g. `-Users-foo-my-project`).
    pub project_dir: String,
    pub modified: SystemTime,
    pub size: u64,
}

/// Escape a working directory the way Claude Code names project directories.
///
/// Every character that is not ASCII alphanumeric or `-` becomes `-`, so
/// `/home/u/my.app` maps to `-home-u-my-app`.
pub fn encode_project_dir(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Check whether `s` is a full session UUID (8-4-4-4-12 hex digits).
pub fn is_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

/// List project directories under `sessions_dir`, skipping symlinks and files.
///
/// A missing `sessions_dir` yields an empty list, not an error.
pub fn project_dirs(sessions_dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = match std::fs::read_dir(sessions_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("transcript directory does not exist: {:?}", sessions_dir);
            return Ok(Vec::new());
        }
        Err(e) => return Err(DiscoveryError::io(sessions_dir, e)),
    };

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        // `DirEntry::file_type` does not follow symlinks.
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// List `*.jsonl` transcripts directly inside one project directory.
///
/// Hard-linked duplicates are collapsed (first path wins in name order).
pub fn list_transcripts(project_dir: &Path) -> Vec<TranscriptFile> {
    let entries = match std::fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot read project dir {:?}: {}", project_dir, e);
            return Vec::new();
        }
    };

    let project_name = project_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        if !seen.insert(file_identity(&path, &metadata)) {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let session_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        files.push(TranscriptFile {
            session_id,
            path,
            project_dir: project_name.clone(),
            modified,
            size: metadata.len(),
        });
    }
    files
}

/// Scan the whole transcript corpus under `sessions_dir`.
pub fn scan_corpus(sessions_dir: &Path) -> Result<Vec<TranscriptFile>, DiscoveryError> {
    let mut files = Vec::new();
    for dir in project_dirs(sessions_dir)? {
        files.extend(list_transcripts(&dir));
    }
    debug!(count = files.len(), "scanned transcript corpus");
    Ok(files)
}

#[cfg(unix)]
fn file_identity(_path: &Path, metadata: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(path: &Path, _metadata: &std::fs::Metadata) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Human-readable project name for an escaped project directory.
///
/// Hyphens in real directory names look like path separators, so the name is
/// decoded by trying the candidate splits in [`get_join_variants`] and picking
/// the first one that exists on this machine.
pub fn project_display_name(encoded_name: &str) -> String {
    if encoded_name.is_empty() {
        return String::new();
    }
    let variants = get_join_variants(encoded_name);
    let chosen = variants
        .iter()
        .find(|v| Path::new(v.as_str()).exists())
        .or_else(|| variants.last())
        .cloned()
        .unwrap_or_default();
    Path::new(&chosen)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(chosen)
}

/// Candidate decodings of an escaped project directory name, most split first.
///
/// For `-Users-foo-my-project` this yields `/Users/foo/my/project`,
/// `/Users/foo/my-project`, `/Users/foo-my-project`.
pub fn get_join_variants(encoded_name: &str) -> Vec<String> {
    let name = encoded_name.strip_prefix('-').unwrap_or(encoded_name);
    if name.is_empty() {
        return vec!["/".to_string()];
    }

    let parts: Vec<&str> = name.split('-').collect();
    let mut variants = vec![format!("/{}", parts.join("/"))];

    // Keep hyphens inside the trailing 2..=3 components.
    for tail in 2..=3usize {
        if parts.len() > tail {
            let (rest, last) = parts.split_at(parts.len() - tail);
            let v = format!("/{}/{}", rest.join("/"), last.join("-"));
            if !variants.contains(&v) {
                variants.push(v);
            }
        }
    }
    variants
}
