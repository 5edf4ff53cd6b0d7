//! Apply patches as a single commit on the remote repository's branch.

use std::sync::Arc;

use async_trait::async_trait;

use apex_core::patch::{FileChange, PatchRecord, PatchStatus};

use super::{commit_message, ensure_valid, PatchSink};
use crate::error::AgentError;
use crate::github::{CommitChange, GithubClient};

pub struct RemoteCommitSink {
    client: Arc<GithubClient>,
}

impl RemoteCommitSink {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn to_commit_changes(files: &[FileChange]) -> Vec<CommitChange> {
    files
        .iter()
        .map(|change| CommitChange {
            path: change.path().trim_start_matches("./").to_string(),
            content: change.content().map(str::to_string),
        })
        .collect()
}

#[async_trait]
impl PatchSink for RemoteCommitSink {
    async fn apply_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError> {
        ensure_valid(record)?;

        let changes = to_commit_changes(&record.patch.files);
        match self.client.commit_changes(&changes, &commit_message(record)).await {
            Ok(sha) => {
                tracing::info!(
                    patch_id = %record.id,
                    repo = %self.client.repo_key(),
                    branch = %self.client.branch(),
                    %sha,
                    "Committed patch to remote",
                );
                record.commit_sha = Some(sha);
                record.transition(PatchStatus::Applied, None);
                Ok(true)
            }
            Err(e) => {
                tracing::error!(patch_id = %record.id, error = %e, "Remote commit failed");
                record.transition(PatchStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Remote commits are not reverted automatically.
    async fn rollback_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError> {
        tracing::warn!(
            patch_id = %record.id,
            commit_sha = record.commit_sha.as_deref().unwrap_or("-"),
            "Rollback is not supported for remote commits",
        );
        Ok(false)
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}
