//! Apply patches to a working tree on local disk.
//!
//! Every apply first snapshots the affected files into
//! `<root>/.patch-backups/<timestamp>-<patch_id>/`. The snapshot holds a
//! `manifest.json` recording which paths existed, plus a copy of each one
//! that did. A failed apply restores the snapshot before returning, and
//! [`LocalFilesystemSink::rollback_patch`] restores the newest snapshot for
//! a patch id.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use apex_core::patch::{FileChange, PatchRecord, PatchStatus};
use apex_core::types::Timestamp;

use super::protection::{PathProtection, BACKUP_DIR, LOCK_FILES};
use super::{commit_message, ensure_valid, git, PatchSink};
use crate::error::AgentError;
use crate::process::run_command;

pub const TYPE_CHECK_TIMEOUT: Duration = Duration::from_secs(120);

const MANIFEST_FILE: &str = "manifest.json";
const SNAPSHOT_FILES_DIR: &str = "files";

#[derive(Debug, Clone, Default)]
pub struct LocalSinkOptions {
    /// Run before applying; a failure is logged, not fatal.
    pub type_check_command: Option<Vec<String>>,
    pub git_auto_commit: bool,
    /// Only meaningful with `git_auto_commit`.
    pub git_auto_push: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupManifest {
    patch_id: String,
    created_at: Timestamp,
    entries: Vec<BackupEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupEntry {
    path: String,
    existed: bool,
}

pub struct LocalFilesystemSink {
    root: PathBuf,
    options: LocalSinkOptions,
    protection: PathProtection,
}

impl LocalFilesystemSink {
    pub fn new(root: impl Into<PathBuf>, options: LocalSinkOptions) -> Self {
        Self {
            root: root.into(),
            options,
            protection: PathProtection::new()
                .with_forbidden_files(LOCK_FILES.iter().map(PathBuf::from)),
        }
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    async fn type_check(&self) {
        let Some(argv) = &self.options.type_check_command else {
            return;
        };
        match run_command(argv, &self.root, TYPE_CHECK_TIMEOUT).await {
            Ok(out) if out.success() => {
                tracing::debug!(duration_ms = out.duration_ms, "Type check passed");
            }
            Ok(out) => {
                tracing::warn!(
                    exit_code = out.exit_code,
                    output = %out.diagnostics(),
                    "Type check failed; applying anyway",
                );
            }
            Err(e) => tracing::warn!(error = %e, "Type check could not run"),
        }
    }

    /// Every target that already exists must be a regular file; snapshots
    /// copy single files only.
    async fn check_targets(
        &self,
        record: &PatchRecord,
        paths: &[(String, PathBuf)],
    ) -> Result<(), AgentError> {
        for (change, (path, rel)) in record.patch.files.iter().zip(paths) {
            let meta = match tokio::fs::metadata(self.root.join(rel)).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if meta.is_file() {
                continue;
            }
            return Err(match change {
                FileChange::Delete { .. } => AgentError::InvalidPatch(format!(
                    "Cannot delete directory '{path}'; list the files to delete individually"
                )),
                _ => AgentError::InvalidPatch(format!(
                    "Cannot {} '{path}': it is not a regular file",
                    change.action()
                )),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    async fn create_backup(
        &self,
        patch_id: &str,
        paths: &[(String, PathBuf)],
    ) -> Result<PathBuf, AgentError> {
        let now = Utc::now();
        let dir = self
            .backup_root()
            .join(format!("{}-{patch_id}", now.format("%Y%m%dT%H%M%S%3fZ")));
        let files_dir = dir.join(SNAPSHOT_FILES_DIR);
        tokio::fs::create_dir_all(&files_dir).await?;

        let mut entries = Vec::with_capacity(paths.len());
        for (path, rel) in paths {
            let source = self.root.join(rel);
            let existed = tokio::fs::try_exists(&source).await?;
            if existed {
                let target = files_dir.join(rel);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&source, &target).await?;
            }
            entries.push(BackupEntry {
                path: path.clone(),
                existed,
            });
        }

        let manifest = BackupManifest {
            patch_id: patch_id.to_string(),
            created_at: now,
            entries,
        };
        tokio::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?).await?;

        tracing::debug!(patch_id, backup = %dir.display(), "Created backup");
        Ok(dir)
    }

    async fn restore_backup(&self, dir: &Path) -> Result<(), AgentError> {
        let raw = tokio::fs::read(dir.join(MANIFEST_FILE)).await?;
        let manifest: BackupManifest = serde_json::from_slice(&raw)?;

        for entry in &manifest.entries {
            let rel = self.protection.validate(&entry.path)?;
            let target = self.root.join(&rel);
            if entry.existed {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(dir.join(SNAPSHOT_FILES_DIR).join(&rel), &target).await?;
            } else {
                match tokio::fs::remove_file(&target).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tracing::info!(
            patch_id = %manifest.patch_id,
            files = manifest.entries.len(),
            "Restored backup",
        );
        Ok(())
    }

    /// Newest snapshot directory for `patch_id`, if any.
    async fn latest_backup(&self, patch_id: &str) -> Result<Option<PathBuf>, AgentError> {
        let mut read_dir = match tokio::fs::read_dir(self.backup_root()).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!("-{patch_id}");
        let mut latest: Option<String> = None;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&suffix) && latest.as_ref().map_or(true, |l| name > *l) {
                latest = Some(name);
            }
        }
        Ok(latest.map(|name| self.backup_root().join(name)))
    }

    // -----------------------------------------------------------------------
    // File actions
    // -----------------------------------------------------------------------

    async fn apply_change(&self, change: &FileChange, rel: &Path) -> Result<(), AgentError> {
        let target = self.root.join(rel);
        match change {
            FileChange::Create { content, .. } | FileChange::Modify { content, .. } => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, content).await?;
                tracing::debug!(path = %change.path(), action = change.action(), "Wrote file");
            }
            FileChange::Delete { .. } => match tokio::fs::remove_file(&target).await {
                Ok(()) => tracing::debug!(path = %change.path(), "Deleted file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %change.path(), "File to delete does not exist");
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    async fn apply_all(
        &self,
        record: &PatchRecord,
        paths: &[(String, PathBuf)],
    ) -> Result<(), AgentError> {
        for (change, (_, rel)) in record.patch.files.iter().zip(paths) {
            self.apply_change(change, rel)
                .await
                .map_err(|e| AgentError::Apply(format!("{} '{}': {e}", change.action(), change.path())))?;
        }
        Ok(())
    }

    async fn publish(&self, record: &mut PatchRecord) {
        if !self.options.git_auto_commit {
            return;
        }
        match git::commit(&self.root, &record.files, &commit_message(record)).await {
            Ok(sha) => {
                tracing::info!(patch_id = %record.id, %sha, "Committed patch");
                record.commit_sha = Some(sha);
            }
            Err(e) => {
                tracing::error!(patch_id = %record.id, error = %e, "Failed to commit patch");
                return;
            }
        }
        if self.options.git_auto_push {
            if let Err(e) = git::push(&self.root).await {
                tracing::error!(patch_id = %record.id, error = %e, "Failed to push patch");
            }
        }
    }
}

#[async_trait]
impl PatchSink for LocalFilesystemSink {
    async fn apply_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError> {
        ensure_valid(record)?;

        let mut paths = Vec::with_capacity(record.patch.files.len());
        for change in &record.patch.files {
            match self.protection.validate(change.path()) {
                Ok(rel) => paths.push((change.path().to_string(), rel)),
                Err(e) => {
                    record.transition(PatchStatus::Failed, Some(e.to_string()));
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.check_targets(record, &paths).await {
            record.transition(PatchStatus::Failed, Some(e.to_string()));
            return Err(e);
        }

        self.type_check().await;

        let backup = match self.create_backup(&record.id, &paths).await {
            Ok(dir) => dir,
            Err(e) => {
                record.transition(PatchStatus::Failed, Some(format!("Backup failed: {e}")));
                return Err(e);
            }
        };

        if let Err(e) = self.apply_all(record, &paths).await {
            tracing::error!(patch_id = %record.id, error = %e, "Apply failed; restoring backup");
            if let Err(restore_err) = self.restore_backup(&backup).await {
                tracing::error!(patch_id = %record.id, error = %restore_err, "Failed to restore backup");
            }
            record.transition(PatchStatus::Failed, Some(e.to_string()));
            return Err(e);
        }

        record.transition(PatchStatus::Applied, None);
        self.publish(record).await;

        tracing::info!(patch_id = %record.id, files = paths.len(), "Applied patch locally");
        Ok(true)
    }

    async fn rollback_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError> {
        let Some(backup) = self.latest_backup(&record.id).await? else {
            tracing::warn!(patch_id = %record.id, "No backup found for rollback");
            return Ok(false);
        };
        self.restore_backup(&backup).await?;
        record.transition(PatchStatus::RolledBack, None);
        Ok(true)
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
