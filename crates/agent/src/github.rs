//! GitHub REST client: raw file reads, recursive tree listing and single
//! commits through the Git data API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::GithubConfig;
use crate::error::AgentError;
use crate::llm::censor_api_key;

const USER_AGENT: &str = "apex-agent";
const API_VERSION: &str = "2022-11-28";
const BLOB_MODE: &str = "100644";

/// One file of a direct commit. `content: None` deletes the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitChange {
    pub path: String,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaRef,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaRef,
}

pub struct GithubClient {
    client: Client,
    config: GithubConfig,
    /// Blob paths per `owner/repo`, filled on first listing.
    tree_cache: RwLock<HashMap<String, Vec<String>>>,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            tree_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn repo_key(&self) -> String {
        format!("{}/{}", self.config.owner, self.config.repo)
    }

    pub fn branch(&self) -> &str {
        &self.config.branch
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_accepting(method, path, "application/vnd.github+json")
    }

    fn request_accepting(&self, method: Method, path: &str, accept: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        );
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<reqwest::Response, AgentError> {
        let resp = req
            .send()
            .await
            .map_err(|e| self.error(format!("{what}: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(self.error(format!("{what}: HTTP {status}: {body}")))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<T, AgentError> {
        self.send(req, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| self.error(format!("{what}: unexpected response: {e}")))
    }

    fn error(&self, message: String) -> AgentError {
        AgentError::SourceControl(censor_api_key(&message, &self.config.token))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every blob path on the configured branch. Cached per `owner/repo`.
    pub async fn list_files(&self) -> Result<Vec<String>, AgentError> {
        let key = self.repo_key();
        if let Some(paths) = self.tree_cache.read().await.get(&key) {
            return Ok(paths.clone());
        }

        let req = self
            .request(Method::GET, &format!("git/trees/{}", self.config.branch))
            .query(&[("recursive", "1")]);
        let listing: TreeListing = self.send_json(req, "list repository tree").await?;
        if listing.truncated {
            tracing::warn!(repo = %key, "Repository tree listing was truncated by GitHub");
        }

        let paths: Vec<String> = listing
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect();
        tracing::debug!(repo = %key, files = paths.len(), "Cached repository tree");

        self.tree_cache.write().await.insert(key, paths.clone());
        Ok(paths)
    }

    /// Raw contents of `path` on the configured branch.
    pub async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let req = self
            .request_accepting(
                Method::GET,
                &format!("contents/{}", path.trim_start_matches('/')),
                "application/vnd.github.raw+json",
            )
            .query(&[("ref", self.config.branch.as_str())]);
        self.send(req, &format!("read {path}"))
            .await?
            .text()
            .await
            .map_err(|e| self.error(format!("read {path}: {e}")))
    }

    // -----------------------------------------------------------------------
    // Direct commit
    // -----------------------------------------------------------------------

    /// Commit `changes` on top of the branch head in one commit and move the
    /// branch to it. Returns the new commit sha.
    ///
    /// The ref update is not forced, so a head that moved since it was read
    /// makes GitHub reject the update instead of discarding the other commit.
    pub async fn commit_changes(
        &self,
        changes: &[CommitChange],
        message: &str,
    ) -> Result<String, AgentError> {
        let branch = &self.config.branch;

        let head: RefResponse = self
            .send_json(
                self.request(Method::GET, &format!("git/ref/heads/{branch}")),
                "read branch ref",
            )
            .await?;
        let parent_sha = head.object.sha;

        let parent: CommitResponse = self
            .send_json(
                self.request(Method::GET, &format!("git/commits/{parent_sha}")),
                "read head commit",
            )
            .await?;

        let entries: Vec<Value> = changes
            .iter()
            .map(|c| match &c.content {
                Some(content) => json!({
                    "path": c.path,
                    "mode": BLOB_MODE,
                    "type": "blob",
                    "content": content,
                }),
                None => json!({
                    "path": c.path,
                    "mode": BLOB_MODE,
                    "type": "blob",
                    "sha": Value::Null,
                }),
            })
            .collect();

        let tree: ShaRef = self
            .send_json(
                self.request(Method::POST, "git/trees")
                    .json(&json!({ "base_tree": parent.tree.sha, "tree": entries })),
                "create tree",
            )
            .await?;

        let commit: ShaRef = self
            .send_json(
                self.request(Method::POST, "git/commits").json(&json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent_sha],
                })),
                "create commit",
            )
            .await?;

        self.send(
            self.request(Method::PATCH, &format!("git/refs/heads/{branch}"))
                .json(&json!({ "sha": commit.sha, "force": false })),
            "update branch ref",
        )
        .await?;

        self.tree_cache.write().await.remove(&self.repo_key());
        tracing::info!(repo = %self.repo_key(), %branch, sha = %commit.sha, files = changes.len(), "Committed patch");
        Ok(commit.sha)
    }
}
