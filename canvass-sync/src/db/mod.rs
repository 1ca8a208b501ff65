//! Local durable record store (SQLite)

pub mod records;
pub mod retry;
pub mod surveys;

pub use retry::retry_on_lock;

use canvass_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize SQLite database pool with all tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create sync-engine tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interview_records (
            id TEXT PRIMARY KEY,
            survey_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            responses TEXT NOT NULL,
            answers TEXT,
            metadata TEXT NOT NULL,
            audio_offline_path TEXT,
            audio_upload_status TEXT NOT NULL DEFAULT 'none',
            status TEXT NOT NULL DEFAULT 'pending',
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            sync_progress INTEGER NOT NULL DEFAULT 0,
            sync_stage TEXT,
            last_error TEXT,
            last_failure_class TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interview_records_status \
         ON interview_records(status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS survey_schemas (
            survey_id TEXT PRIMARY KEY,
            schema TEXT NOT NULL,
            cached_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
