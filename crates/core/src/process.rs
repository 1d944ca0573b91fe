// crates/core/src/process.rs
//! Process-lineage inspection used to trace the calling Claude Code session.
//!
//! Claude Code keeps a file open under its tasks directory whose path contains
//! the session UUID. Walking up from the current process and listing each
//! ancestor's open files recovers that UUID without any heuristics.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex_lite::Regex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Maximum number of ancestors inspected.
pub const MAX_ANCESTORS: usize = 8;

const LSOF_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only view of the process table.
pub trait ProcessInspector: Send + Sync {
    /// Ancestors of the current process, nearest first, excluding init.
    fn ancestors(&self) -> Vec<u32>;

    /// Paths currently open by `pid`. Empty when they cannot be listed.
    fn open_files(&self, pid: u32) -> Vec<PathBuf>;
}

/// [`ProcessInspector`] backed by `sysinfo` plus `/proc` or `lsof`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessInspector;

impl ProcessInspector for SystemProcessInspector {
    fn ancestors(&self) -> Vec<u32> {
        let Ok(current) = sysinfo::get_current_pid() else {
            return Vec::new();
        };
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut chain = Vec::new();
        let mut pid: Pid = current;
        while chain.len() < MAX_ANCESTORS {
            let Some(parent) = sys.process(pid).and_then(|p| p.parent()) else {
                break;
            };
            if parent.as_u32() <= 1 {
                break;
            }
            chain.push(parent.as_u32());
            pid = parent;
        }
        chain
    }

    fn open_files(&self, pid: u32) -> Vec<PathBuf> {
        if cfg!(target_os = "linux") {
            proc_fd_paths(pid)
        } else {
            lsof_paths(pid)
        }
    }
}

fn proc_fd_paths(pid: u32) -> Vec<PathBuf> {
    let fd_dir = PathBuf::from(format!("/proc/{pid}/fd"));
    match std::fs::read_dir(&fd_dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| std::fs::read_link(e.path()).ok())
            .collect(),
        Err(e) => {
            tracing::debug!(pid, error = %e, "cannot list open files");
            Vec::new()
        }
    }
}

fn lsof_paths(pid: u32) -> Vec<PathBuf> {
    let pid_arg = pid.to_string();
    let mut cmd = std::process::Command::new("lsof");
    cmd.args(["-Fn", "-p", pid_arg.as_str()]);
    match crate::claude_path::run_with_timeout(&mut cmd, LSOF_TIMEOUT) {
        Some(output) if output.status.success() => {
            parse_lsof_names(&String::from_utf8_lossy(&output.stdout))
        }
        _ => {
            tracing::debug!(pid, "lsof unavailable or failed");
            Vec::new()
        }
    }
}

/// Parse `lsof -Fn` output: file names are the lines prefixed with `n`.
pub fn parse_lsof_names(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix('n'))
        .map(PathBuf::from)
        .collect()
}

/// First session UUID embedded in a path under `tasks_dir`.
pub fn task_session_id(path: &Path, tasks_dir: &Path) -> Option<String> {
    if !path.starts_with(tasks_dir) {
        return None;
    }
    let text = path.to_string_lossy();
    find_uuid(&text).map(str::to_string)
}

fn uuid_regex() -> Option<&'static Regex> {
    static UUID: OnceLock<Option<Regex>> = OnceLock::new();
    UUID.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()
    })
    .as_ref()
}

/// Locate the first lowercase 8-4-4-4-12 UUID inside `text`.
pub fn find_uuid(text: &str) -> Option<&str> {
    uuid_regex()?.find(text).map(|m| m.as_str())
}
