//! Collaborator seams of the orchestrator and their SQLite implementation.
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::db::{self, Pool, RawFilters};
use crate::model::{CleanReview, Envelope, PrepareCompleted, RawReview};

#[async_trait]
pub trait RawReviewSource: Send + Sync {
    /// Reviews matching `filters`, ascending by review time.
    async fn fetch(&self, filters: &RawFilters) -> Result<Vec<RawReview>>;
}

#[async_trait]
pub trait CleanReviewSink: Send + Sync {
    /// All-or-nothing upsert keyed by review id.
    async fn upsert_batch(&self, rows: &[CleanReview]) -> Result<()>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_completed(&self, saga_id: &str, event: &PrepareCompleted) -> Result<()>;
}

/// Raw store, clean store and completion outbox sharing one SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RawReviewSource for SqliteStore {
    async fn fetch(&self, filters: &RawFilters) -> Result<Vec<RawReview>> {
        db::fetch_raw_reviews(&self.pool, filters)
            .await
            .context("failed to fetch raw reviews")
    }
}

#[async_trait]
impl CleanReviewSink for SqliteStore {
    async fn upsert_batch(&self, rows: &[CleanReview]) -> Result<()> {
        db::upsert_clean_batch(&self.pool, rows)
            .await
            .context("failed to persist clean batch")
    }
}

#[async_trait]
impl EventPublisher for SqliteStore {
    async fn publish_completed(&self, saga_id: &str, event: &PrepareCompleted) -> Result<()> {
        let envelope = Envelope::prepare_completed(saga_id, event.clone());
        let payload = serde_json::to_string(&envelope).context("failed to encode completion event")?;
        db::insert_completed_event(&self.pool, &envelope.event_id.to_string(), saga_id, &payload)
            .await
            .context("failed to write completion event")?;
        info!(
            saga_id,
            event_id = %envelope.event_id,
            clean_count = event.clean_count,
            "published prepare completed"
        );
        Ok(())
    }
}
