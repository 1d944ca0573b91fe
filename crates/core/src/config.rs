//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the optional TOML file
//! (`$HANDOFF_CONFIG` or `<data_dir>/config.toml`), then environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::paths;

pub const DEFAULT_CLAUDE_MODEL: &str = "sonnet";
pub const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-3-flash-preview";
pub const DEFAULT_CLAUDE_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_BATCH_DELAY_SECS: f64 = 0.5;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;
pub const DEFAULT_PORT: u16 = 47895;
pub const DEFAULT_LOG_LEVEL: &str = "warn,handoff=info";

/// Fully resolved configuration shared by every component.
#[derive(Debug, Clone)]
pub struct HandoffConfig {
    pub data_dir: PathBuf,
    pub handoffs_dir: PathBuf,
    pub index_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub claude_model: String,
    pub claude_timeout_secs: u64,
    pub openrouter_model: String,
    pub openrouter_api_key: Option<String>,
    pub batch_delay_secs: f64,
    pub batch_concurrency: usize,
    pub port: u16,
    pub log_level: String,
    /// Ignored values found while loading. Loading runs before logging is
    /// set up, so these are reported later through [`Self::report_warnings`].
    pub warnings: Vec<String>,
}

/// On-disk overrides. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    sessions_dir: Option<PathBuf>,
    tasks_dir: Option<PathBuf>,
    claude_model: Option<String>,
    claude_timeout_secs: Option<u64>,
    openrouter_model: Option<String>,
    batch_delay_secs: Option<f64>,
    batch_concurrency: Option<usize>,
    port: Option<u16>,
    log_level: Option<String>,
}

impl HandoffConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` as the variable source.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match env("HANDOFF_DATA_DIR") {
            Some(dir) => expand_home(&dir),
            None => paths::default_data_dir().ok_or(ConfigError::HomeDirNotFound)?,
        };

        let config_path = env("HANDOFF_CONFIG")
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| data_dir.join("config.toml"));
        let file = read_file_config(&config_path)?;

        let sessions_dir = match env("HANDOFF_SESSIONS_DIR") {
            Some(dir) => expand_home(&dir),
            None => match file.sessions_dir {
                Some(dir) => dir,
                None => paths::default_sessions_dir().ok_or(ConfigError::HomeDirNotFound)?,
            },
        };
        let tasks_dir = env("HANDOFF_TASKS_DIR")
            .map(|d| expand_home(&d))
            .or(file.tasks_dir)
            .unwrap_or_else(|| paths::default_tasks_dir(&sessions_dir));

        let mut warnings = Vec::new();
        let batch_concurrency = parsed_env(
            &env,
            &mut warnings,
            "HANDOFF_BATCH_CONCURRENCY",
            file.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY),
        );
        let batch_delay_secs = parsed_env(
            &env,
            &mut warnings,
            "HANDOFF_BATCH_DELAY",
            file.batch_delay_secs.unwrap_or(DEFAULT_BATCH_DELAY_SECS),
        );
        let claude_timeout_secs = parsed_env(
            &env,
            &mut warnings,
            "HANDOFF_CLAUDE_TIMEOUT",
            file.claude_timeout_secs.unwrap_or(DEFAULT_CLAUDE_TIMEOUT_SECS),
        );
        let port = parsed_env(
            &env,
            &mut warnings,
            "HANDOFF_PORT",
            file.port.unwrap_or(DEFAULT_PORT),
        );

        Ok(Self {
            handoffs_dir: paths::handoffs_dir(&data_dir),
            index_path: paths::index_path(&data_dir),
            data_dir,
            sessions_dir,
            tasks_dir,
            claude_model: env("HANDOFF_CLAUDE_MODEL")
                .or(file.claude_model)
                .unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            claude_timeout_secs,
            openrouter_model: env("HANDOFF_OPENROUTER_MODEL")
                .or(file.openrouter_model)
                .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            openrouter_api_key: env("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()),
            batch_delay_secs,
            batch_concurrency,
            port,
            log_level: env("HANDOFF_LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            warnings,
        })
    }

    /// Configuration rooted entirely under `root`. Used by tests and embedders.
    pub fn rooted_at(root: &Path) -> Self {
        let data_dir = root.join("data");
        let sessions_dir = root.join("projects");
        Self {
            handoffs_dir: paths::handoffs_dir(&data_dir),
            index_path: paths::index_path(&data_dir),
            tasks_dir: root.join("tasks"),
            data_dir,
            sessions_dir,
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            claude_timeout_secs: DEFAULT_CLAUDE_TIMEOUT_SECS,
            openrouter_model: DEFAULT_OPENROUTER_MODEL.to_string(),
            openrouter_api_key: None,
            batch_delay_secs: DEFAULT_BATCH_DELAY_SECS,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            warnings: Vec::new(),
        }
    }

    /// Log the problems collected by [`Self::load_with`].
    pub fn report_warnings(&self) {
        for message in &self.warnings {
            warn!("{message}");
        }
    }

    /// Create the handoff directory if missing. Write paths only.
    pub fn ensure_data_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.handoffs_dir).map_err(|source| ConfigError::Io {
            path: self.handoffs_dir.clone(),
            source,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&raw).map_err(|e| ConfigError::Invalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parsed_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    warnings: &mut Vec<String>,
    key: &str,
    fallback: T,
) -> T {
    match env(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warnings.push(format!("ignoring unparseable config value {key}={raw:?}"));
                fallback
            }
        },
        None => fallback,
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
