//! Repository for the `patches` table.

use sqlx::PgPool;

use crate::models::patch::{PatchRow, UpsertPatch};

/// Column list for `patches` queries.
const COLUMNS: &str = "\
    id, user_id, request, summary, description, files, testing_steps, risks, \
    status, error, commit_sha, metadata, created_at, updated_at";

/// Maximum page size for history listings.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Provides persistence for patch records.
pub struct PatchRepo;

impl PatchRepo {
    /// Insert a patch, or overwrite the mutable columns of an existing one.
    ///
    /// Last writer wins; `created_at` and `user_id` are never overwritten.
    pub async fn upsert(pool: &PgPool, input: &UpsertPatch) -> Result<PatchRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO patches \
                (id, user_id, request, summary, description, files, testing_steps, risks, \
                 status, error, commit_sha, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
                request = EXCLUDED.request, \
                summary = EXCLUDED.summary, \
                description = EXCLUDED.description, \
                files = EXCLUDED.files, \
                testing_steps = EXCLUDED.testing_steps, \
                risks = EXCLUDED.risks, \
                status = EXCLUDED.status, \
                error = EXCLUDED.error, \
                commit_sha = EXCLUDED.commit_sha, \
                metadata = EXCLUDED.metadata, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PatchRow>(&query)
            .bind(&input.id)
            .bind(input.user_id)
            .bind(&input.request)
            .bind(&input.summary)
            .bind(&input.description)
            .bind(&input.files)
            .bind(&input.testing_steps)
            .bind(&input.risks)
            .bind(&input.status)
            .bind(&input.error)
            .bind(&input.commit_sha)
            .bind(&input.metadata)
            .bind(input.created_at)
            .bind(input.updated_at)
            .fetch_one(pool)
            .await
    }

    /// Find a patch by ID.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<PatchRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM patches WHERE id = $1");
        sqlx::query_as::<_, PatchRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List patches newest-first.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PatchRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM patches \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, PatchRow>(&query)
            .bind(limit.clamp(1, MAX_LIST_LIMIT))
            .bind(offset.max(0))
            .fetch_all(pool)
            .await
    }

    /// Update status, error and commit id. Returns the updated row if found.
    pub async fn update_status(
        pool: &PgPool,
        id: &str,
        status: &str,
        error: Option<&str>,
        commit_sha: Option<&str>,
    ) -> Result<Option<PatchRow>, sqlx::Error> {
        let query = format!(
            "UPDATE patches \
             SET status = $2, error = $3, commit_sha = COALESCE($4, commit_sha), updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PatchRow>(&query)
            .bind(id)
            .bind(status)
            .bind(error)
            .bind(commit_sha)
            .fetch_optional(pool)
            .await
    }
}
