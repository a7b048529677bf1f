//! Filters and view models used by repositories.
//!
//! Keep these structs focused on the data moved by queries. Business logic
//! lives in the service layer.

use chrono::{DateTime, Utc};

/// Selection for one prepare request against `raw_reviews`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFilters {
    pub app_id: String,
    /// Empty means no country filter.
    pub countries: Vec<String>,
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Inclusive upper bound.
    pub to: DateTime<Utc>,
    pub limit: Option<u32>,
}

/// Inbox row picked up by the consumer loop.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingRequest {
    pub id: i64,
    pub saga_id: String,
    pub payload: String,
    pub attempt: i32,
}
