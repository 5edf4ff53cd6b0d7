//! Subprocess execution with a timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::AgentError;

/// Captured stdout/stderr beyond this many bytes is dropped.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr if present, stdout otherwise; for error messages.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run `argv` in `cwd`. The child is killed if `timeout` elapses.
pub async fn run_command(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, AgentError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AgentError::Config("empty command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_elapsed) => {
            return Err(AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("'{program}' timed out after {}s", timeout.as_secs()),
            )))
        }
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: truncate_lossy(&output.stdout),
        stderr: truncate_lossy(&output.stderr),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn truncate_lossy(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_OUTPUT_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command(&argv(&["sh", "-c", "echo hi; echo oops >&2; exit 3"]), dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.diagnostics(), "oops");
    }

    #[tokio::test]
    async fn times_out() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command(&argv(&["sleep", "5"]), dir.path(), Duration::from_millis(100)).await;
        assert_matches!(result, Err(AgentError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn empty_command_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            run_command(&[], dir.path(), Duration::from_secs(1)).await,
            Err(AgentError::Config(_))
        );
    }
}
