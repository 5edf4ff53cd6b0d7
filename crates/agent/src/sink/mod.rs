//! Patch application strategies.
//!
//! One [`PatchSink`] is chosen when the service is built: the local
//! filesystem in development, a direct commit to the remote repository in
//! production.

use async_trait::async_trait;

use apex_core::patch::{PatchRecord, PatchStatus};
use apex_core::validation::{format_error_message, validate};

use crate::error::AgentError;

pub mod git;
pub mod local;
pub mod protection;
pub mod remote;

pub use local::{LocalFilesystemSink, LocalSinkOptions};
pub use protection::PathProtection;
pub use remote::RemoteCommitSink;

#[async_trait]
pub trait PatchSink: Send + Sync {
    /// Apply the record's patch and move it to `applied`.
    ///
    /// On error the record is left `failed` with the error recorded, and the
    /// error is returned.
    async fn apply_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError>;

    /// Undo an applied patch. `Ok(false)` means there is nothing to restore.
    async fn rollback_patch(&self, record: &mut PatchRecord) -> Result<bool, AgentError>;

    /// `"local"` or `"remote"`, for logs and API responses.
    fn kind(&self) -> &'static str;
}

/// Re-run structural validation before anything is written.
pub(crate) fn ensure_valid(record: &mut PatchRecord) -> Result<(), AgentError> {
    let result = validate(&record.patch, Some(&record.request));
    if result.valid {
        return Ok(());
    }
    let message = format_error_message(&result);
    record.transition(PatchStatus::Failed, Some(message.clone()));
    Err(AgentError::InvalidPatch(message))
}

/// Commit message embedding the patch id and the original request.
pub fn commit_message(record: &PatchRecord) -> String {
    let title = record
        .patch
        .summary
        .as_deref()
        .unwrap_or("Apply AI admin patch");
    format!(
        "{title}\n\nPatch: {}\nRequest: {}\n",
        record.id,
        record.request.trim()
    )
}
