//! Handlers for the `/admin/agent` resource.
//!
//! All handlers require the workspace owner via [`RequireOwner`].

use apex_agent::generator::GeneratedPatch;
use apex_agent::service::CommandOutcome;
use apex_core::analysis::CodebaseAnalysis;
use apex_core::patch::PatchRecord;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireOwner;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /admin/agent/patches`.
#[derive(Debug, Deserialize)]
pub struct GeneratePatchRequest {
    pub request: String,
}

/// Request body for `POST /admin/agent/commands`.
#[derive(Debug, Deserialize)]
pub struct ExecuteCommandRequest {
    pub request: String,
    #[serde(default)]
    pub auto_apply: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/agent/analysis
pub async fn analyze_codebase(
    State(state): State<AppState>,
    RequireOwner(_owner): RequireOwner,
) -> AppResult<Json<DataResponse<CodebaseAnalysis>>> {
    let analysis = state.patches.analyze_codebase().await?;
    Ok(Json(DataResponse { data: analysis }))
}

/// POST /api/v1/admin/agent/patches
///
/// Generate a patch and store it as `pending`. Returns 201 with the record,
/// validation warnings, quality assessment and a summary of the context used.
pub async fn generate_patch(
    State(state): State<AppState>,
    RequireOwner(owner): RequireOwner,
    payload: Result<Json<GeneratePatchRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<GeneratedPatch>>)> {
    let Json(input) = payload?;
    let generated = state
        .patches
        .generate_patch(&input.request, Some(owner.user_id))
        .await?;

    tracing::info!(
        patch_id = %generated.record.id,
        user_id = owner.user_id,
        "Patch generated via API",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: generated })))
}

/// GET /api/v1/admin/agent/patches?limit=&offset=
pub async fn list_patches(
    State(state): State<AppState>,
    RequireOwner(_owner): RequireOwner,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<PatchRecord>>>> {
    let patches = state
        .patches
        .patch_history(params.limit_or_default(), params.offset_or_default())
        .await?;
    Ok(Json(DataResponse { data: patches }))
}

/// GET /api/v1/admin/agent/patches/{id}
pub async fn get_patch(
    State(state): State<AppState>,
    RequireOwner(_owner): RequireOwner,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<PatchRecord>>> {
    let record = state.patches.get_patch(&id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// POST /api/v1/admin/agent/patches/{id}/apply
pub async fn apply_patch(
    State(state): State<AppState>,
    RequireOwner(owner): RequireOwner,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<PatchRecord>>> {
    let record = state.patches.apply_patch(&id).await?;
    tracing::info!(patch_id = %id, user_id = owner.user_id, status = %record.status, "Patch applied via API");
    Ok(Json(DataResponse { data: record }))
}

/// POST /api/v1/admin/agent/patches/{id}/rollback
pub async fn rollback_patch(
    State(state): State<AppState>,
    RequireOwner(owner): RequireOwner,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<PatchRecord>>> {
    let record = state.patches.rollback_patch(&id).await?;
    tracing::info!(patch_id = %id, user_id = owner.user_id, "Patch rolled back via API");
    Ok(Json(DataResponse { data: record }))
}

/// POST /api/v1/admin/agent/commands
///
/// Generate a patch and apply it when `auto_apply` is set. An apply failure
/// still returns 200; the record carries status `failed` and the error.
pub async fn execute_command(
    State(state): State<AppState>,
    RequireOwner(owner): RequireOwner,
    payload: Result<Json<ExecuteCommandRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<CommandOutcome>>> {
    let Json(input) = payload?;
    let outcome = state
        .patches
        .execute_command(&input.request, input.auto_apply, Some(owner.user_id))
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}
