//! Interview record store operations
//!
//! Status and metadata that must move together are written by a single UPDATE
//! statement, so a crash can never leave a record that disagrees with itself
//! about whether the server has it.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use canvass_common::events::SyncStage;
use canvass_common::{Error, Result};

use super::retry::{retry_on_lock, DEFAULT_LOCK_WAIT_MS};
use crate::error::FailureClass;
use crate::models::{AudioUploadStatus, InterviewRecord, RecordMetadata, RecordStatus};

/// Insert a freshly captured record
pub async fn insert_record(pool: &SqlitePool, record: &InterviewRecord) -> Result<()> {
    // Prepare all data before acquiring a database connection
    let id = record.id.to_string();
    let responses = serde_json::to_string(&record.responses)
        .map_err(|e| Error::Internal(format!("Failed to serialize responses: {}", e)))?;
    let answers = record
        .answers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize answers: {}", e)))?;
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;
    let audio_path = record
        .audio_offline_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let created_at = record.created_at.to_rfc3339();
    let updated_at = record.updated_at.to_rfc3339();

    retry_on_lock("insert_record", DEFAULT_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO interview_records (
                id, survey_id, session_id, responses, answers, metadata,
                audio_offline_path, audio_upload_status, status,
                sync_attempts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.survey_id)
        .bind(&record.session_id)
        .bind(&responses)
        .bind(&answers)
        .bind(&metadata)
        .bind(&audio_path)
        .bind(record.audio_upload_status.as_str())
        .bind(record.status.as_str())
        .bind(record.sync_attempts as i64)
        .bind(&created_at)
        .bind(&updated_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Load one record by client-local id
pub async fn get_record(pool: &SqlitePool, id: Uuid) -> Result<Option<InterviewRecord>> {
    let row = sqlx::query("SELECT * FROM interview_records WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| record_from_row(&r)).transpose()
}

/// Records awaiting delivery, oldest first
///
/// `failed` records re-enter the queue on the next pass; terminal states and
/// records already mid-flight do not.
pub async fn get_pending_records(pool: &SqlitePool) -> Result<Vec<InterviewRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM interview_records
        WHERE status IN ('pending', 'failed')
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Update lifecycle status (and the optional failure reason) only
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: RecordStatus,
    reason: Option<&str>,
) -> Result<()> {
    let id = id.to_string();
    let updated_at = Utc::now().to_rfc3339();

    retry_on_lock("set_status", DEFAULT_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE interview_records
            SET status = ?, last_error = COALESCE(?, last_error), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(&updated_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Atomically persist metadata and status together
///
/// Single UPDATE statement: the server identifiers recorded in metadata and
/// the lifecycle status can never be observed out of step.
pub async fn update_metadata_and_status(
    pool: &SqlitePool,
    id: Uuid,
    metadata: &RecordMetadata,
    status: RecordStatus,
) -> Result<()> {
    let id = id.to_string();
    let metadata = serde_json::to_string(metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;
    let updated_at = Utc::now().to_rfc3339();

    retry_on_lock("update_metadata_and_status", DEFAULT_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE interview_records
            SET metadata = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&metadata)
        .bind(status.as_str())
        .bind(&updated_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Atomically persist the audio upload state and metadata together
///
/// Used by the verification gate: `uploaded` and the verified attachment
/// reference are committed in one statement.
pub async fn update_audio_state(
    pool: &SqlitePool,
    id: Uuid,
    audio_status: AudioUploadStatus,
    metadata: &RecordMetadata,
) -> Result<()> {
    let id = id.to_string();
    let metadata = serde_json::to_string(metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;
    let updated_at = Utc::now().to_rfc3339();

    retry_on_lock("update_audio_state", DEFAULT_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE interview_records
            SET audio_upload_status = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(audio_status.as_str())
        .bind(&metadata)
        .bind(&updated_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Persist per-record progress so a UI can render it across restarts
pub async fn update_sync_progress(
    pool: &SqlitePool,
    id: Uuid,
    percent: u8,
    stage: SyncStage,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE interview_records
        SET sync_progress = ?, sync_stage = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(percent as i64)
    .bind(stage.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record one failed sync attempt: counter, class, error, and resulting
/// status land in a single statement
pub async fn record_failure(
    pool: &SqlitePool,
    id: Uuid,
    attempts: u32,
    class: FailureClass,
    error: &str,
    status: RecordStatus,
) -> Result<()> {
    let id = id.to_string();
    let updated_at = Utc::now().to_rfc3339();

    retry_on_lock("record_failure", DEFAULT_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE interview_records
            SET sync_attempts = ?, last_failure_class = ?, last_error = ?,
                status = ?, sync_stage = 'failed', updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(attempts as i64)
        .bind(class.as_str())
        .bind(error)
        .bind(status.as_str())
        .bind(&updated_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Delete a record from local storage
pub async fn delete_record(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM interview_records WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Requeue records a crashed run left mid-flight
pub async fn requeue_stuck_syncing(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE interview_records
        SET status = 'pending', updated_at = ?
        WHERE status = 'syncing'
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Update the last-sync marker
pub async fn update_last_sync_time(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_meta (key, value) VALUES ('last_sync_time', ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Read the last-sync marker
pub async fn get_last_sync_time(
    pool: &SqlitePool,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = 'last_sync_time'")
            .fetch_optional(pool)
            .await?;

    value
        .map(|v| {
            chrono::DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Failed to parse last_sync_time: {}", e)))
        })
        .transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<InterviewRecord> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Invalid record id {}: {}", id, e)))?;

    let responses: String = row.get("responses");
    let responses = serde_json::from_str(&responses)
        .map_err(|e| Error::Internal(format!("Failed to deserialize responses: {}", e)))?;

    let answers: Option<String> = row.get("answers");
    let answers = answers
        .map(|a| serde_json::from_str(&a))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize answers: {}", e)))?;

    let metadata: String = row.get("metadata");
    let metadata = serde_json::from_str(&metadata)
        .map_err(|e| Error::Internal(format!("Failed to deserialize metadata: {}", e)))?;

    let audio_upload_status: String = row.get("audio_upload_status");
    let audio_upload_status = AudioUploadStatus::parse(&audio_upload_status)
        .ok_or_else(|| Error::Internal(format!("Unknown audio status: {}", audio_upload_status)))?;

    let status: String = row.get("status");
    let status = RecordStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown record status: {}", status)))?;

    let last_failure_class: Option<String> = row.get("last_failure_class");
    let last_failure_class = last_failure_class.as_deref().and_then(FailureClass::parse);

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&Utc);

    let audio_offline_path: Option<String> = row.get("audio_offline_path");

    Ok(InterviewRecord {
        id,
        survey_id: row.get("survey_id"),
        session_id: row.get("session_id"),
        responses,
        answers,
        metadata,
        audio_offline_path: audio_offline_path.map(std::path::PathBuf::from),
        audio_upload_status,
        status,
        sync_attempts: row.get::<i64, _>("sync_attempts") as u32,
        last_error: row.get("last_error"),
        last_failure_class,
        created_at,
        updated_at,
    })
}
