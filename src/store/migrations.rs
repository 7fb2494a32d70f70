//! Version-tracked schema migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL; `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::StoreError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS wardrobe_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            brand TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'Uncategorized',
            size TEXT NOT NULL DEFAULT '',
            quantity INTEGER NOT NULL DEFAULT 1,
            price TEXT NOT NULL DEFAULT '',
            color_tag TEXT NOT NULL DEFAULT 'unknown',
            color_hex TEXT NOT NULL DEFAULT '#808080',
            image_url TEXT NOT NULL DEFAULT '',
            source_email_id TEXT NOT NULL DEFAULT '',
            source_order_id TEXT NOT NULL DEFAULT '',
            retailer TEXT NOT NULL DEFAULT '',
            added_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_items_user ON wardrobe_items(user_id);
        CREATE INDEX IF NOT EXISTS idx_items_source
            ON wardrobe_items(source_email_id, source_order_id);
        CREATE INDEX IF NOT EXISTS idx_items_image ON wardrobe_items(image_url);

        CREATE TABLE IF NOT EXISTS ingest_jobs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            state TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_user ON ingest_jobs(user_id, created_at);
    "#,
}];

/// Apply any migrations newer than the recorded schema version.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(e.to_string()))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                StoreError::Migration(format!("{} failed: {e}", migration.name))
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, datetime('now'))",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        _ => Ok(0),
    }
}
