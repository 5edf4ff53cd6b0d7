use std::sync::Arc;

use apex_agent::PatchService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: apex_db::DbPool,
    /// Server configuration (owner id and JWT settings for the extractors).
    pub config: Arc<ServerConfig>,
    /// The patch pipeline, built once at startup.
    pub patches: Arc<PatchService>,
}
