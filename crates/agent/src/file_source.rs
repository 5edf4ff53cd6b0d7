//! Where project files are listed and read from.
//!
//! Production reads the remote repository; development reads the local
//! working tree. Both return paths relative to the project root with `/`
//! separators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ignore::WalkBuilder;

use crate::error::AgentError;
use crate::github::GithubClient;

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Every file path in the project.
    async fn list_files(&self) -> Result<Vec<String>, AgentError>;

    /// Contents of one file.
    async fn read_file(&self, path: &str) -> Result<String, AgentError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Local working tree
// ---------------------------------------------------------------------------

/// Reads the local tree, honouring `.gitignore`.
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn list_files(&self) -> Result<Vec<String>, AgentError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| AgentError::Io(std::io::Error::other(e)))?
    }

    async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        Ok(tokio::fs::read_to_string(self.root.join(path)).await?)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

fn walk(root: &Path) -> Result<Vec<String>, AgentError> {
    let mut paths = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "node_modules" | ".next" | ".patch-backups")
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry during walk");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            paths.push(to_slash(rel));
        }
    }
    paths.sort();
    Ok(paths)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Remote repository
// ---------------------------------------------------------------------------

/// Reads the configured GitHub branch.
pub struct GithubFileSource {
    client: Arc<GithubClient>,
}

impl GithubFileSource {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileSource for GithubFileSource {
    async fn list_files(&self) -> Result<Vec<String>, AgentError> {
        self.client.list_files().await
    }

    async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        self.client.read_file(path).await
    }

    fn describe(&self) -> String {
        format!("github:{}@{}", self.client.repo_key(), self.client.branch())
    }
}
