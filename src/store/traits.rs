//! Wardrobe persistence trait and stored models.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::IngestOutcome;

/// A normalized wardrobe item as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: Uuid,
    pub user_id: String,
    pub brand: String,
    pub name: String,
    pub category: String,
    pub size: String,
    pub quantity: u32,
    /// Formatted price exactly as the mail carried it, e.g. `₹ 3,330.00`.
    pub price: String,
    pub color_tag: String,
    pub color_hex: String,
    pub image_url: String,
    pub source_email_id: String,
    pub source_order_id: String,
    pub retailer: String,
    pub added_at: DateTime<Utc>,
}

/// Lifecycle of an ingest job, as reported by the status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running { processed: usize, total: usize },
    Completed { outcome: IngestOutcome },
    Failed { message: String },
}

impl JobState {
    pub fn status_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running { .. } => "running",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub user_id: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Async persistence seam for wardrobe items and job history.
#[async_trait]
pub trait WardrobeStore: Send + Sync {
    async fn insert_item(&self, item: &WardrobeItem) -> Result<(), StoreError>;

    async fn items_for_user(&self, user_id: &str) -> Result<Vec<WardrobeItem>, StoreError>;

    async fn record_job(&self, job: &JobRecord) -> Result<(), StoreError>;

    async fn update_job(&self, id: Uuid, state: &JobState) -> Result<(), StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<JobRecord, StoreError>;

    async fn recent_jobs(&self, user_id: &str, limit: u32) -> Result<Vec<JobRecord>, StoreError>;
}
