//! Route definitions for the AI admin agent.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::admin_agent;
use crate::state::AppState;

/// Owner-only routes mounted at `/admin/agent`.
///
/// All routes require the configured owner (enforced by handler extractors).
///
/// ```text
/// GET    /analysis                  -> analyze_codebase
/// GET    /patches                   -> list_patches
/// POST   /patches                   -> generate_patch
/// GET    /patches/{id}              -> get_patch
/// POST   /patches/{id}/apply        -> apply_patch
/// POST   /patches/{id}/rollback     -> rollback_patch
/// POST   /commands                  -> execute_command
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analysis", get(admin_agent::analyze_codebase))
        .route(
            "/patches",
            get(admin_agent::list_patches).post(admin_agent::generate_patch),
        )
        .route("/patches/{id}", get(admin_agent::get_patch))
        .route("/patches/{id}/apply", post(admin_agent::apply_patch))
        .route("/patches/{id}/rollback", post(admin_agent::rollback_patch))
        .route("/commands", post(admin_agent::execute_command))
}
