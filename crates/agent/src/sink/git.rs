//! Git publishing for locally applied patches.

use std::path::Path;
use std::time::Duration;

use crate::error::AgentError;
use crate::process::run_command;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

async fn git(root: &Path, args: &[&str]) -> Result<String, AgentError> {
    let mut argv = vec!["git".to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));

    let output = run_command(&argv, root, GIT_TIMEOUT).await.map_err(|e| {
        AgentError::SourceControl(format!(
            "Failed to execute git. Is it installed and in your PATH? Error: {e}"
        ))
    })?;

    if !output.success() {
        return Err(AgentError::SourceControl(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            output.diagnostics()
        )));
    }
    Ok(output.stdout)
}

/// Stage `paths` (including deletions) and commit them. Returns the new
/// HEAD sha.
pub async fn commit(root: &Path, paths: &[String], message: &str) -> Result<String, AgentError> {
    let mut add: Vec<&str> = vec!["add", "-A", "--"];
    add.extend(paths.iter().map(String::as_str));
    git(root, &add).await?;
    git(root, &["commit", "-m", message]).await?;
    let sha = git(root, &["rev-parse", "HEAD"]).await?;
    Ok(sha.trim().to_string())
}

pub async fn push(root: &Path) -> Result<(), AgentError> {
    git(root, &["push"]).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "admin@example.com"],
            vec!["config", "user.name", "Admin"],
        ] {
            git(dir, &args).await.unwrap();
        }
    }

    #[tokio::test]
    async fn commits_written_and_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        std::fs::write(dir.path().join("old.ts"), "x").unwrap();
        commit(dir.path(), &["old.ts".into()], "seed").await.unwrap();

        std::fs::remove_file(dir.path().join("old.ts")).unwrap();
        std::fs::write(dir.path().join("new.ts"), "y").unwrap();
        let sha = commit(dir.path(), &["old.ts".into(), "new.ts".into()], "swap").await.unwrap();
        assert_eq!(sha.len(), 40);

        let files = git(dir.path(), &["ls-files"]).await.unwrap();
        assert_eq!(files.trim(), "new.ts");
    }

    #[tokio::test]
    async fn failure_is_source_control_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = git(dir.path(), &["rev-parse", "HEAD"]).await;
        assert!(matches!(result, Err(AgentError::SourceControl(_))));
    }
}
