//! Patch payload and record types.
//!
//! [`PatchData`] is the contract the LLM must satisfy. File entries are a
//! tagged union over `action`, so a decoded patch can never carry an unknown
//! action; the raw-text boundary lives in [`crate::validation::decode_patch`].

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Action constants
// ---------------------------------------------------------------------------

pub const ACTION_CREATE: &str = "create";
pub const ACTION_MODIFY: &str = "modify";
pub const ACTION_DELETE: &str = "delete";

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPLIED: &str = "applied";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_ROLLED_BACK: &str = "rolled_back";

/// Prefix of every generated patch identifier.
pub const PATCH_ID_PREFIX: &str = "patch_";

/// Maximum length of a change request in characters.
pub const MAX_REQUEST_LENGTH: usize = 10_000;

// ---------------------------------------------------------------------------
// Patch payload
// ---------------------------------------------------------------------------

/// One file instruction inside a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FileChange {
    Create {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    Modify {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    Delete {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::Modify { path, .. } | Self::Delete { path, .. } => {
                path
            }
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => ACTION_CREATE,
            Self::Modify { .. } => ACTION_MODIFY,
            Self::Delete { .. } => ACTION_DELETE,
        }
    }

    /// New file content, `None` for deletions.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Create { content, .. } | Self::Modify { content, .. } => Some(content),
            Self::Delete { .. } => None,
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match self {
            Self::Create { explanation, .. }
            | Self::Modify { explanation, .. }
            | Self::Delete { explanation, .. } => explanation.as_deref(),
        }
    }
}

/// The structured patch produced by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchData {
    pub files: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub testing_steps: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_changes: Option<serde_json::Value>,
}

impl PatchData {
    /// Paths touched by this patch, in declaration order.
    pub fn affected_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path().to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// Patch record
// ---------------------------------------------------------------------------

/// Lifecycle state of a stored patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Pending,
    Applied,
    Failed,
    RolledBack,
}

impl PatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Applied => STATUS_APPLIED,
            Self::Failed => STATUS_FAILED,
            Self::RolledBack => STATUS_ROLLED_BACK,
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_PENDING => Ok(Self::Pending),
            STATUS_APPLIED => Ok(Self::Applied),
            STATUS_FAILED => Ok(Self::Failed),
            STATUS_ROLLED_BACK => Ok(Self::RolledBack),
            other => Err(CoreError::Validation(format!(
                "Invalid patch status '{other}'. Must be one of: {STATUS_PENDING}, \
                 {STATUS_APPLIED}, {STATUS_FAILED}, {STATUS_ROLLED_BACK}"
            ))),
        }
    }
}

impl std::fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated patch plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub id: String,
    pub user_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub request: String,
    pub patch: PatchData,
    pub files: Vec<String>,
    pub status: PatchStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub quality_score: Option<u8>,
}

impl PatchRecord {
    /// Wrap a freshly generated patch into a `pending` record.
    pub fn new(
        id: impl Into<String>,
        request: impl Into<String>,
        patch: PatchData,
        user_id: Option<DbId>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            user_id,
            created_at: now,
            updated_at: now,
            request: request.into(),
            files: patch.affected_paths(),
            patch,
            status: PatchStatus::Pending,
            error: None,
            commit_sha: None,
            quality_score: None,
        }
    }

    /// Move to `status`, stamping `updated_at`.
    pub fn transition(&mut self, status: PatchStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.updated_at = chrono::Utc::now();
    }
}

/// Issues `patch_<unix millis>` identifiers that never repeat for one
/// sequence: a second id in the same millisecond takes the next free one.
#[derive(Debug, Default)]
pub struct PatchIdSequence {
    last_millis: AtomicI64,
}

impl PatchIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, at: Timestamp) -> String {
        let wanted = at.timestamp_millis();
        let mut last = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = wanted.max(last + 1);
            match self.last_millis.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("{PATCH_ID_PREFIX}{next}"),
                Err(actual) => last = actual,
            }
        }
    }
}

/// Validate a free-text change request: non-blank and within length limit.
pub fn validate_request_text(text: &str) -> Result<(), CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Validation("Request must not be empty".to_string()));
    }
    let len = text.chars().count();
    if len > MAX_REQUEST_LENGTH {
        return Err(CoreError::Validation(format!(
            "Request exceeds maximum length of {MAX_REQUEST_LENGTH} characters (got {len})"
        )));
    }
    Ok(())
}

/// Validate that `id` looks like a generated patch identifier.
pub fn validate_patch_id(id: &str) -> Result<(), CoreError> {
    let valid = id
        .strip_prefix(PATCH_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid patch id '{id}'. Expected '{PATCH_ID_PREFIX}<timestamp>'"
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_patch() -> PatchData {
        PatchData {
            files: vec![
                FileChange::Create {
                    path: "src/theme.ts".into(),
                    content: "export const dark = true;".into(),
                    explanation: Some("theme toggle".into()),
                },
                FileChange::Delete {
                    path: "src/old.ts".into(),
                    explanation: None,
                },
            ],
            summary: Some("Add dark mode".into()),
            description: None,
            testing_steps: vec!["Toggle the theme".into()],
            risks: vec![],
            database_changes: None,
        }
    }

    #[test]
    fn file_change_deserializes_by_action_tag() {
        let change: FileChange = serde_json::from_value(json!({
            "path": "a.ts",
            "action": "modify",
            "content": "x"
        }))
        .unwrap();
        assert_eq!(change.action(), ACTION_MODIFY);
        assert_eq!(change.content(), Some("x"));
        assert_eq!(change.explanation(), None);
    }

    #[test]
    fn patch_data_uses_camel_case_keys() {
        let value = serde_json::to_value(sample_patch()).unwrap();
        assert!(value.get("testingSteps").is_some());
        assert_eq!(value["files"][1]["action"], "delete");
        assert!(value["files"][1].get("content").is_none());
    }

    #[test]
    fn affected_paths_preserve_order() {
        assert_eq!(sample_patch().affected_paths(), vec!["src/theme.ts", "src/old.ts"]);
    }

    #[test]
    fn new_record_is_pending_with_prefixed_id() {
        let id = PatchIdSequence::new().next_id(chrono::Utc::now());
        let record = PatchRecord::new(id, "add dark mode", sample_patch(), Some(7));
        assert_eq!(record.status, PatchStatus::Pending);
        assert!(validate_patch_id(&record.id).is_ok());
        assert_eq!(record.files.len(), 2);
        assert_eq!(record.user_id, Some(7));
    }

    #[test]
    fn ids_issued_in_the_same_millisecond_are_distinct() {
        let ids = PatchIdSequence::new();
        let at = chrono::Utc::now();
        let a = ids.next_id(at);
        let b = ids.next_id(at);
        assert_eq!(a, format!("{PATCH_ID_PREFIX}{}", at.timestamp_millis()));
        assert_eq!(b, format!("{PATCH_ID_PREFIX}{}", at.timestamp_millis() + 1));
        assert!(validate_patch_id(&b).is_ok());
    }

    #[test]
    fn separate_sequences_share_no_state() {
        let at = chrono::Utc::now();
        let first = PatchIdSequence::new();
        first.next_id(at);
        first.next_id(at);
        assert_eq!(
            PatchIdSequence::new().next_id(at),
            format!("{PATCH_ID_PREFIX}{}", at.timestamp_millis())
        );
    }

    #[test]
    fn status_parse_round_trips() {
        for status in [
            PatchStatus::Pending,
            PatchStatus::Applied,
            PatchStatus::Failed,
            PatchStatus::RolledBack,
        ] {
            assert_eq!(PatchStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PatchStatus::parse("merged").is_err());
    }

    #[test]
    fn transition_sets_error_and_status() {
        let mut record = PatchRecord::new("patch_1", "r", sample_patch(), None);
        record.transition(PatchStatus::Failed, Some("disk full".into()));
        assert_eq!(record.status, PatchStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn request_text_bounds() {
        assert!(validate_request_text("add dark mode").is_ok());
        assert!(validate_request_text("   ").is_err());
        assert!(validate_request_text(&"a".repeat(MAX_REQUEST_LENGTH + 1)).is_err());
    }

    #[test]
    fn validate_patch_id_rejects_garbage() {
        assert!(validate_patch_id("patch_").is_err());
        assert!(validate_patch_id("patch_12a").is_err());
        assert!(validate_patch_id("1234").is_err());
        assert!(validate_patch_id("patch_1712345678901").is_ok());
    }
}
