//! Well-known role names and the owner gate for admin procedures.

use crate::error::CoreError;
use crate::types::DbId;

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_MEMBER: &str = "member";

/// Only the configured owner may drive the patch agent.
pub fn ensure_owner(user_id: DbId, owner_id: DbId) -> Result<(), CoreError> {
    if user_id == owner_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "Only the workspace owner can use the admin agent".to_string(),
        ))
    }
}
