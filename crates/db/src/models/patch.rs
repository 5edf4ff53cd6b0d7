//! Patch row model and record conversions.

use apex_core::error::CoreError;
use apex_core::patch::{FileChange, PatchData, PatchRecord, PatchStatus};
use apex_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `patches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PatchRow {
    pub id: String,
    pub user_id: Option<DbId>,
    pub request: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub files: serde_json::Value,
    pub testing_steps: serde_json::Value,
    pub risks: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub commit_sha: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Contents of the `metadata` column: the full payload as generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub patch: PatchData,
    #[serde(default)]
    pub quality_score: Option<u8>,
}

/// Column values for an insert or update, derived from a record.
#[derive(Debug, Clone)]
pub struct UpsertPatch {
    pub id: String,
    pub user_id: Option<DbId>,
    pub request: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub files: serde_json::Value,
    pub testing_steps: serde_json::Value,
    pub risks: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub commit_sha: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UpsertPatch {
    pub fn from_record(record: &PatchRecord) -> Result<Self, CoreError> {
        let to_json = |v: serde_json::Result<serde_json::Value>| {
            v.map_err(|e| CoreError::Internal(format!("Failed to serialize patch: {e}")))
        };
        let metadata = PatchMetadata {
            patch: record.patch.clone(),
            quality_score: record.quality_score,
        };

        Ok(Self {
            id: record.id.clone(),
            user_id: record.user_id,
            request: record.request.clone(),
            summary: record.patch.summary.clone(),
            description: record.patch.description.clone(),
            files: to_json(serde_json::to_value(&record.patch.files))?,
            testing_steps: to_json(serde_json::to_value(&record.patch.testing_steps))?,
            risks: to_json(serde_json::to_value(&record.patch.risks))?,
            status: record.status.as_str().to_string(),
            error: record.error.clone(),
            commit_sha: record.commit_sha.clone(),
            metadata: to_json(serde_json::to_value(&metadata))?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl PatchRow {
    /// Rebuild the domain record.
    ///
    /// The payload comes from `metadata` when it decodes; otherwise it is
    /// reassembled from the flat columns, which older rows always carry.
    pub fn into_record(self) -> Result<PatchRecord, CoreError> {
        let status = PatchStatus::parse(&self.status)?;

        let (patch, quality_score) =
            match serde_json::from_value::<PatchMetadata>(self.metadata.clone()) {
                Ok(meta) => (meta.patch, meta.quality_score),
                Err(_) => (self.patch_from_columns()?, None),
            };

        Ok(PatchRecord {
            files: patch.affected_paths(),
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            request: self.request,
            patch,
            status,
            error: self.error,
            commit_sha: self.commit_sha,
            quality_score,
        })
    }

    fn patch_from_columns(&self) -> Result<PatchData, CoreError> {
        let files: Vec<FileChange> = serde_json::from_value(self.files.clone()).map_err(|e| {
            CoreError::Internal(format!("Patch {} has malformed files column: {e}", self.id))
        })?;
        Ok(PatchData {
            files,
            summary: self.summary.clone(),
            description: self.description.clone(),
            testing_steps: serde_json::from_value(self.testing_steps.clone()).unwrap_or_default(),
            risks: serde_json::from_value(self.risks.clone()).unwrap_or_default(),
            database_changes: None,
        })
    }
}
