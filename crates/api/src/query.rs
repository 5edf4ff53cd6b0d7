//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Default page size for history listings.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Generic pagination parameters (`?limit=&offset=`). Clamped in the store.
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    pub fn limit_or_default(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset_or_default(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}
