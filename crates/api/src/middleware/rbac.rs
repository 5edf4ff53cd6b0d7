//! Owner gate for the admin agent routes.

use apex_core::roles::ensure_owner;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the authenticated user to be the configured owner
/// (`ADMIN_OWNER_ID`). Rejects with 401 without a valid token and 403 for
/// anyone else.
///
/// ```ignore
/// async fn owner_only(RequireOwner(owner): RequireOwner) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireOwner(pub AuthUser);

impl FromRequestParts<AppState> for RequireOwner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if let Err(e) = ensure_owner(user.user_id, state.config.owner_user_id) {
            tracing::warn!(user_id = user.user_id, role = %user.role, "Non-owner attempted admin agent access");
            return Err(e.into());
        }
        Ok(RequireOwner(user))
    }
}
