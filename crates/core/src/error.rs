// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Hint appended to every resolution failure shown to a caller.
pub const EXPLICIT_ID_HINT: &str = "pass an explicit session id (full UUID or 8+ character prefix)";

/// Errors that can occur while resolving the current session transcript.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("session not found: {reason}; {hint}", hint = EXPLICIT_ID_HINT)]
    NotFound { reason: String },

    #[error("ambiguous session id {id}: matches {count} transcripts; {hint}", hint = EXPLICIT_ID_HINT)]
    Ambiguous { id: String, count: usize },

    #[error("invalid session id {id:?}: {reason}; {hint}", hint = EXPLICIT_ID_HINT)]
    InvalidId { id: String, reason: String },

    #[error("transcript directory not found: {path}")]
    ProjectsDirNotFound { path: PathBuf },
}

impl ResolveError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when scanning the transcript tree.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Transcript directory not found: {path}")]
    ProjectsDirNotFound { path: PathBuf },

    #[error("Cannot access transcript directory: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::ProjectsDirNotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors raised by the handoff store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Handoff not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied accessing handoff: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error on handoff {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed handoff {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while turning a raw transcript into canonical text.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("IO error reading transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcript {path} has no extractable content")]
    Empty { path: PathBuf },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display_carries_hint() {
        let err = ResolveError::not_found("no transcript modified within 30s");
        let msg = err.to_string();
        assert!(msg.contains("no transcript modified within 30s"));
        assert!(msg.contains("explicit session id"));

        let err = ResolveError::Ambiguous {
            id: "1b2f6f6b".into(),
            count: 2,
        };
        assert!(err.to_string().contains("matches 2 transcripts"));
    }

    #[test]
    fn test_store_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            StoreError::io("/h/a.md", io_err),
            StoreError::NotFound { .. }
        ));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            StoreError::io("/h/a.md", io_err),
            StoreError::PermissionDenied { .. }
        ));

        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(matches!(
            StoreError::io("/h/a.md", io_err),
            StoreError::Io { .. }
        ));
    }

    #[test]
    fn test_discovery_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = DiscoveryError::io("/test/path", io_err);
        assert!(matches!(err, DiscoveryError::ProjectsDirNotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DiscoveryError::io("/test/path", io_err);
        assert!(matches!(err, DiscoveryError::PermissionDenied { .. }));
    }
}
