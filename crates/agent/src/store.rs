//! Patch persistence.
//!
//! [`PgPatchStore`] backs the server; [`MemoryPatchStore`] backs the CLI and
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use apex_core::patch::PatchRecord;
use apex_db::models::patch::UpsertPatch;
use apex_db::repositories::PatchRepo;
use apex_db::DbPool;

use crate::error::AgentError;

/// Largest page [`PatchStore::list_recent`] returns.
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[async_trait]
pub trait PatchStore: Send + Sync {
    /// Insert or fully replace a record.
    async fn save(&self, record: &PatchRecord) -> Result<(), AgentError>;

    /// Persist only the lifecycle fields (status, error, commit sha).
    async fn save_status(&self, record: &PatchRecord) -> Result<(), AgentError> {
        self.save(record).await
    }

    async fn find(&self, id: &str) -> Result<Option<PatchRecord>, AgentError>;

    /// Newest first.
    async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<PatchRecord>, AgentError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgPatchStore {
    pool: DbPool,
}

impl PgPatchStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatchStore for PgPatchStore {
    async fn save(&self, record: &PatchRecord) -> Result<(), AgentError> {
        let input = UpsertPatch::from_record(record)?;
        PatchRepo::upsert(&self.pool, &input).await?;
        Ok(())
    }

    async fn save_status(&self, record: &PatchRecord) -> Result<(), AgentError> {
        let updated = PatchRepo::update_status(
            &self.pool,
            &record.id,
            record.status.as_str(),
            record.error.as_deref(),
            record.commit_sha.as_deref(),
        )
        .await?;
        match updated {
            Some(_) => Ok(()),
            None => self.save(record).await,
        }
    }

    async fn find(&self, id: &str) -> Result<Option<PatchRecord>, AgentError> {
        PatchRepo::find_by_id(&self.pool, id)
            .await?
            .map(|row| row.into_record().map_err(AgentError::from))
            .transpose()
    }

    async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<PatchRecord>, AgentError> {
        PatchRepo::list_recent(&self.pool, limit, offset)
            .await?
            .into_iter()
            .map(|row| row.into_record().map_err(AgentError::from))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPatchStore {
    records: RwLock<HashMap<String, PatchRecord>>,
}

impl MemoryPatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatchStore for MemoryPatchStore {
    async fn save(&self, record: &PatchRecord) -> Result<(), AgentError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<PatchRecord>, AgentError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<PatchRecord>, AgentError> {
        let mut records: Vec<PatchRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.clamp(1, MAX_HISTORY_LIMIT) as usize)
            .collect())
    }
}
