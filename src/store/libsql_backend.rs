//! libSQL implementation of the `WardrobeStore` trait.
//!
//! A single connection is reused for all operations; `libsql::Connection`
//! is `Send + Sync` and safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{JobRecord, JobState, WardrobeItem, WardrobeStore};

pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Connection(format!("create db directory: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("open database: {e}")))?;
        let store = Self::from_db(db).await?;
        info!(path = %path.display(), "Wardrobe database opened");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("open in-memory database: {e}")))?;
        Self::from_db(db).await
    }

    async fn from_db(db: Database) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("connect: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

fn query_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn row_to_item(row: &Row) -> Result<WardrobeItem, StoreError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let added_str: String = row.get(14).map_err(query_err)?;
    Ok(WardrobeItem {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("item id: {e}")))?,
        user_id: row.get(1).map_err(query_err)?,
        brand: row.get(2).map_err(query_err)?,
        name: row.get(3).map_err(query_err)?,
        category: row.get(4).map_err(query_err)?,
        size: row.get(5).map_err(query_err)?,
        quantity: row.get::<i64>(6).unwrap_or(1) as u32,
        price: row.get(7).map_err(query_err)?,
        color_tag: row.get(8).map_err(query_err)?,
        color_hex: row.get(9).map_err(query_err)?,
        image_url: row.get(10).map_err(query_err)?,
        source_email_id: row.get(11).map_err(query_err)?,
        source_order_id: row.get(12).map_err(query_err)?,
        retailer: row.get(13).map_err(query_err)?,
        added_at: parse_datetime(&added_str),
    })
}

fn row_to_job(row: &Row) -> Result<JobRecord, StoreError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let state_json: String = row.get(3).map_err(query_err)?;
    let created: String = row.get(4).map_err(query_err)?;
    let updated: String = row.get(5).map_err(query_err)?;
    Ok(JobRecord {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("job id: {e}")))?,
        user_id: row.get(1).map_err(query_err)?,
        state: serde_json::from_str(&state_json)
            .map_err(|e| StoreError::Serialization(format!("job state: {e}")))?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const ITEM_COLUMNS: &str = "id, user_id, brand, name, category, size, quantity, price, \
                            color_tag, color_hex, image_url, source_email_id, \
                            source_order_id, retailer, added_at";

#[async_trait]
impl WardrobeStore for LibSqlStore {
    async fn insert_item(&self, item: &WardrobeItem) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO wardrobe_items (id, user_id, brand, name, category, size, quantity, \
                 price, color_tag, color_hex, image_url, source_email_id, source_order_id, \
                 retailer, added_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    item.id.to_string(),
                    item.user_id.clone(),
                    item.brand.clone(),
                    item.name.clone(),
                    item.category.clone(),
                    item.size.clone(),
                    item.quantity as i64,
                    item.price.clone(),
                    item.color_tag.clone(),
                    item.color_hex.clone(),
                    item.image_url.clone(),
                    item.source_email_id.clone(),
                    item.source_order_id.clone(),
                    item.retailer.clone(),
                    item.added_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn items_for_user(&self, user_id: &str) -> Result<Vec<WardrobeItem>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM wardrobe_items \
                     WHERE user_id = ?1 ORDER BY added_at"
                ),
                params![user_id],
            )
            .await
            .map_err(query_err)?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn record_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(&job.state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO ingest_jobs (id, user_id, status, state, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    job.id.to_string(),
                    job.user_id.clone(),
                    job.state.status_str(),
                    state_json,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn update_job(&self, id: Uuid, state: &JobState) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let changed = self
            .conn
            .execute(
                "UPDATE ingest_jobs SET status = ?1, state = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    state.status_str(),
                    state_json,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(query_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "ingest_job".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<JobRecord, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, status, state, created_at, updated_at \
                 FROM ingest_jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await {
            Ok(Some(row)) => row_to_job(&row),
            _ => Err(StoreError::NotFound {
                entity: "ingest_job".into(),
                id: id.to_string(),
            }),
        }
    }

    async fn recent_jobs(&self, user_id: &str, limit: u32) -> Result<Vec<JobRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, status, state, created_at, updated_at \
                 FROM ingest_jobs WHERE user_id = ?1 \
                 ORDER BY created_at DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut jobs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }
}
