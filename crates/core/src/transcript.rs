// crates/core/src/transcript.rs
//! Cheap transcript statistics for pre-extraction triviality filtering.
//!
//! Scans raw JSONL bytes with `memchr` finders instead of deserializing every
//! line; a batch run calls this once per transcript in the corpus.

use std::path::Path;

use chrono::{DateTime, Utc};
use memchr::memmem;

use crate::error::NormalizeError;

/// Fewer exchanges than this marks a transcript trivial.
pub const MIN_EXCHANGES: usize = 3;
/// A first-to-last timestamp span shorter than this marks a transcript trivial.
pub const MIN_SPAN_SECS: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptStats {
    pub user_lines: usize,
    pub assistant_lines: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl TranscriptStats {
    /// Completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        self.user_lines.min(self.assistant_lines)
    }

    /// Seconds between the first and last timestamped line, if both exist.
    pub fn span_secs(&self) -> Option<i64> {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => Some((last - first).num_seconds()),
            _ => None,
        }
    }

    /// Too small to be worth an extraction call.
    pub fn is_trivial(&self) -> bool {
        if self.exchanges() < MIN_EXCHANGES {
            return true;
        }
        matches!(self.span_secs(), Some(span) if span < MIN_SPAN_SECS)
    }
}

/// Read and scan one transcript file.
pub fn scan_transcript(path: &Path) -> Result<TranscriptStats, NormalizeError> {
    let data = std::fs::read(path).map_err(|source| NormalizeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(scan_bytes(&data))
}

/// Scan raw JSONL bytes.
pub fn scan_bytes(data: &[u8]) -> TranscriptStats {
    let mut stats = TranscriptStats::default();

    let user_finder = memmem::Finder::new(b"\"type\":\"user\"");
    let asst_finder = memmem::Finder::new(b"\"type\":\"assistant\"");
    let ts_finder = memmem::Finder::new(b"\"timestamp\":\"");

    for line in split_lines(data) {
        if line.is_empty() {
            continue;
        }

        if user_finder.find(line).is_some() {
            stats.user_lines += 1;
        } else if asst_finder.find(line).is_some() {
            stats.assistant_lines += 1;
        } else {
            continue;
        }

        if let Some(ts) = extract_timestamp(line, &ts_finder) {
            if stats.first_timestamp.is_none() {
                stats.first_timestamp = Some(ts);
            }
            stats.last_timestamp = Some(ts);
        }
    }

    stats
}

fn extract_timestamp(line: &[u8], finder: &memmem::Finder) -> Option<DateTime<Utc>> {
    let start = finder.find(line)? + finder.needle().len();
    let rest = &line[start..];
    let end = memchr::memchr(b'"', rest)?;
    let raw = std::str::from_utf8(&rest[..end]).ok()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split data into lines using SIMD-accelerated newline search.
fn split_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0;
    let mut positions = memchr::memchr_iter(b'\n', data).chain(std::iter::once(data.len()));

    std::iter::from_fn(move || {
        if start > data.len() {
            return None;
        }
        positions.next().map(|end| {
            let line = &data[start..end];
            start = end + 1;
            line
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: &str, ts: &str) -> String {
        format!(r#"{{"type":"{kind}","timestamp":"{ts}","message":{{"content":"x"}}}}"#)
    }

    #[test]
    fn test_scan_empty() {
        let stats = scan_bytes(b"");
        assert_eq!(stats.exchanges(), 0);
        assert!(stats.is_trivial());
    }

    #[test]
    fn test_scan_counts_and_span() {
        let data = [
            line("user", "2026-03-01T10:00:00Z"),
            line("assistant", "2026-03-01T10:01:00Z"),
            line("user", "2026-03-01T10:05:00Z"),
            line("assistant", "2026-03-01T10:06:00Z"),
            line("user", "2026-03-01T10:10:00Z"),
            line("assistant", "2026-03-01T10:12:30Z"),
            r#"{"type":"summary","summary":"s"}"#.to_string(),
        ]
        .join("\n");

        let stats = scan_bytes(data.as_bytes());
        assert_eq!(stats.user_lines, 3);
        assert_eq!(stats.assistant_lines, 3);
        assert_eq!(stats.exchanges(), 3);
        assert_eq!(stats.span_secs(), Some(750));
        assert!(!stats.is_trivial());
    }

    #[test]
    fn test_short_span_is_trivial() {
        let data = [
            line("user", "2026-03-01T10:00:00Z"),
            line("assistant", "2026-03-01T10:00:05Z"),
            line("user", "2026-03-01T10:00:10Z"),
            line("assistant", "2026-03-01T10:00:15Z"),
            line("user", "2026-03-01T10:00:20Z"),
            line("assistant", "2026-03-01T10:00:25Z"),
        ]
        .join("\n");
        let stats = scan_bytes(data.as_bytes());
        assert_eq!(stats.exchanges(), 3);
        assert!(stats.is_trivial());
    }

    #[test]
    fn test_missing_timestamps_use_exchange_count_only() {
        let data = "{\"type\":\"user\"}\n{\"type\":\"assistant\"}\n".repeat(4);
        let stats = scan_bytes(data.as_bytes());
        assert_eq!(stats.span_secs(), None);
        assert!(!stats.is_trivial());
    }

    #[test]
    fn test_scan_transcript_missing_file() {
        let err = scan_transcript(Path::new("/nonexistent/x.jsonl")).unwrap_err();
        assert!(matches!(err, NormalizeError::Io { .. }));
    }
}
