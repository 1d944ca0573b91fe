// crates/core/src/llm/claude_cli.rs
//! Claude CLI extractor: spawns the `claude` process and parses JSON output.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;

use super::provider::Extractor;
use super::schema::{build_extraction_prompt, parse_response};
use super::types::{ExtractError, ExtractedHandoff, ExtractionRequest};

/// Env vars set by a running Claude Code session. Stripped from the child so
/// it does not detect a nested session.
const KNOWN_SESSION_VARS: [&str; 3] = ["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];

/// Interactive, high-quality extractor backed by the Claude CLI.
///
/// Runs `claude -p --output-format json --model {model}` with the prompt on
/// stdin (transcripts are far larger than argv limits).
pub struct ClaudeCliExtractor {
    model: String,
    timeout_secs: u64,
    binary: Option<String>,
}

impl ClaudeCliExtractor {
    /// Model names: "haiku", "sonnet", "opus"
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timeout_secs: crate::config::DEFAULT_CLAUDE_TIMEOUT_SECS,
            binary: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Override the binary instead of resolving `claude` from the login shell.
    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.binary = Some(path.into());
        self
    }

    fn binary(&self) -> &str {
        self.binary
            .as_deref()
            .or_else(|| crate::resolved_cli_path())
            .unwrap_or("claude")
    }

    async fn spawn_and_collect(&self, prompt: &str) -> Result<String, ExtractError> {
        use tokio::time::{timeout, Duration};

        let t0 = std::time::Instant::now();
        let stripped = stripped_env_vars();
        tracing::info!(
            model = %self.model,
            timeout_secs = self.timeout_secs,
            prompt_len = prompt.len(),
            "claude CLI: spawning"
        );

        let mut cmd = TokioCommand::new(self.binary());
        cmd.args(["-p", "--output-format", "json", "--model", &self.model])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for var in &stripped {
            cmd.env_remove(var);
        }

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(error = %e, "claude CLI: failed to spawn process");
            ExtractError::NotAvailable(format!("cannot run {}: {e}", self.binary()))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractError::ProviderError("failed to capture stdin".into()))?;
        let prompt = prompt.to_owned();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(prompt.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::error!(elapsed_ms = t0.elapsed().as_millis() as u64, "claude CLI: timed out");
                ExtractError::Timeout(self.timeout_secs)
            })?
            .map_err(|e| ExtractError::ProviderError(format!("failed to wait for CLI: {e}")))?;

        if let Ok(Err(e)) = writer.await {
            tracing::warn!(error = %e, "claude CLI: stdin write failed");
        }

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.chars().take(500).collect();
            tracing::error!(elapsed_ms, exit_code = ?output.status.code(), stderr = %snippet, "claude CLI: non-zero exit");
            return Err(ExtractError::ProviderError(format!(
                "claude exited with {:?}: {}",
                output.status.code(),
                snippet.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        tracing::info!(elapsed_ms, stdout_len = stdout.len(), "claude CLI: response received");
        Ok(stdout)
    }
}

/// The known session vars plus any other `CLAUDE*` var in this environment.
fn stripped_env_vars() -> Vec<String> {
    KNOWN_SESSION_VARS
        .iter()
        .map(|s| s.to_string())
        .chain(
            std::env::vars()
                .map(|(k, _)| k)
                .filter(|k| k.starts_with("CLAUDE") && !KNOWN_SESSION_VARS.contains(&k.as_str())),
        )
        .collect()
}

#[async_trait]
impl Extractor for ClaudeCliExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractedHandoff, ExtractError> {
        let prompt = build_extraction_prompt(&request.transcript, request.project_hint.as_deref());
        let stdout = self.spawn_and_collect(&prompt).await?;
        parse_response(&stdout)
    }

    fn name(&self) -> &str {
        "claude-cli"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
