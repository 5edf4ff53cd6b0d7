pub mod admin_agent;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /admin/agent/analysis                  codebase analysis (GET)
/// /admin/agent/patches                   history (GET), generate (POST)
/// /admin/agent/patches/{id}              get
/// /admin/agent/patches/{id}/apply        apply (POST)
/// /admin/agent/patches/{id}/rollback     rollback (POST)
/// /admin/agent/commands                  generate and optionally apply (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/admin/agent", admin_agent::router())
}
