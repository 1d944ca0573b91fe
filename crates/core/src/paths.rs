//! Default locations for handoff data and Claude Code transcripts.
//!
//! Single source of truth for `~`-relative defaults; everything else goes through
//! [`HandoffConfig`](crate::config::HandoffConfig).

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

/// Data root: `~/.handoff/`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".handoff"))
}

/// Claude Code transcript root: `~/.claude/projects/`.
pub fn default_sessions_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".claude").join("projects"))
}

/// Task directory that sits next to the transcript root: `<sessions_dir>/../tasks`.
pub fn default_tasks_dir(sessions_dir: &Path) -> PathBuf {
    sessions_dir
        .parent()
        .map(|p| p.join("tasks"))
        .unwrap_or_else(|| sessions_dir.join("tasks"))
}

/// Handoff documents directory inside the data root.
pub fn handoffs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("handoffs")
}

/// Persisted index file inside the data root.
pub fn index_path(data_dir: &Path) -> PathBuf {
    data_dir.join("handoff-index.json")
}

/// Date partition relative path: `YYYY/MM/DD`.
pub fn date_partition(date: NaiveDate) -> PathBuf {
    PathBuf::from(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}
