// crates/core/src/claude_path.rs
//! Locate the `claude` binary used by the interactive extractor.
//!
//! Resolved through the user's login shell first so that nvm, mise, asdf and
//! `~/.local/bin` installs are found even when `handoff` runs from a hook with a
//! minimal PATH.

use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

/// Timeout for each probe subprocess.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

static RESOLVED_CLI_PATH: OnceLock<Option<String>> = OnceLock::new();

/// Resolved path to the `claude` binary, computed on first call.
pub fn resolved_cli_path() -> Option<&'static str> {
    RESOLVED_CLI_PATH.get_or_init(find_claude_path).as_deref()
}

/// Login shell, then inherited PATH, then known install locations.
fn find_claude_path() -> Option<String> {
    if let Ok(shell) = std::env::var("SHELL") {
        if let Some(path) = which_via(Command::new(&shell).args(["-lc", "which claude"])) {
            if Path::new(&path).exists() {
                tracing::debug!(%path, "claude resolved via login shell");
                return Some(path);
            }
        }
    }

    if let Some(path) = which_via(Command::new("which").arg("claude")) {
        tracing::debug!(%path, "claude resolved via PATH");
        return Some(path);
    }

    let found = scan_known_paths();
    if found.is_none() {
        tracing::debug!("claude binary not found");
    }
    found
}

fn which_via(cmd: &mut Command) -> Option<String> {
    let output = run_with_timeout(cmd, PROBE_TIMEOUT)?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout)
        .lines()
        .last()
        .unwrap_or_default()
        .trim()
        .to_string();
    (!path.is_empty()).then_some(path)
}

fn scan_known_paths() -> Option<String> {
    let home = dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default();
    [
        format!("{home}/.local/bin/claude"),
        format!("{home}/.claude/local/claude"),
        "/opt/homebrew/bin/claude".to_string(),
        "/usr/local/bin/claude".to_string(),
        "/usr/bin/claude".to_string(),
    ]
    .into_iter()
    .find(|p| Path::new(p).exists())
}

/// Run a probe command, killing it after `limit`.
///
/// Output pipes are drained on reader threads while the child runs, so a
/// chatty child never blocks on a full pipe. `CLAUDECODE` is removed so a CLI
/// launched from inside a session does not refuse to start.
pub(crate) fn run_with_timeout(cmd: &mut Command, limit: Duration) -> Option<std::process::Output> {
    let mut child = cmd
        .env_remove("CLAUDECODE")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .ok()?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = std::time::Instant::now() + limit;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    tracing::debug!(?limit, "probe command timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    // Reader threads finish on their own once every writer exits.
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return None,
        }
    };

    Some(std::process::Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_cli_path_is_cached() {
        let first = resolved_cli_path();
        let second = resolved_cli_path();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_which_via_takes_last_line() {
        let path = which_via(Command::new("sh").args(["-c", "echo motd; echo /usr/bin/x"]));
        assert_eq!(path.as_deref(), Some("/usr/bin/x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_large_output_is_not_lost() {
        let started = std::time::Instant::now();
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "head -c 200000 /dev/zero | tr '\\0' 'n'"]),
            Duration::from_secs(3),
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 200_000);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_command_times_out() {
        assert!(run_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(200)
        )
        .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_which_via_failure_is_none() {
        assert!(which_via(Command::new("sh").args(["-c", "exit 1"])).is_none());
    }
}
