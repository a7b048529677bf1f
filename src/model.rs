use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PREPARE_COMPLETED_KIND: &str = "pipeline.prepare_completed";

/// Review as written by the upstream collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawReview {
    pub id: String,
    pub app_id: String,
    pub country: String,
    pub rating: i32,
    pub title: String,
    pub content: String,
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub response_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_content: Option<String>,
}

/// Normalized, classified and language-tagged review. One per raw id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CleanReview {
    pub id: String,
    pub app_id: String,
    pub country: String,
    pub rating: i32,
    pub title: String,
    pub content_clean: String,
    pub language: String,
    pub content_en: Option<String>,
    pub is_contentful: bool,
    pub reviewed_at: DateTime<Utc>,
    pub response_date: Option<DateTime<Utc>>,
    pub response_content_clean: Option<String>,
}

/// Inbound request to prepare one application's reviews.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub app_id: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub date_from: String,
    #[serde(default)]
    pub date_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Completion signal emitted once the clean batch is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareCompleted {
    #[serde(flatten)]
    pub request: PrepareRequest,
    /// Contentful rows produced, counted before `clean_ids` is capped.
    pub clean_count: usize,
    pub clean_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub event_id: Uuid,
    pub saga_id: String,
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: T,
}

impl Envelope<PrepareCompleted> {
    pub fn prepare_completed(saga_id: &str, payload: PrepareCompleted) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            saga_id: saga_id.to_string(),
            kind: PREPARE_COMPLETED_KIND.to_string(),
            occurred_at: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Failed => "failed",
        }
    }
}
