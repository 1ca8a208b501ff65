//! Survey schema cache
//!
//! Schemas are cached when a survey is downloaded for capture; the response
//! builder reads them back to reconstruct canonical answers offline.

use chrono::Utc;
use sqlx::SqlitePool;

use canvass_common::{Error, Result};

use crate::models::SurveySchema;

/// Store or refresh a cached schema
pub async fn cache_schema(pool: &SqlitePool, schema: &SurveySchema) -> Result<()> {
    let body = serde_json::to_string(schema)
        .map_err(|e| Error::Internal(format!("Failed to serialize schema: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO survey_schemas (survey_id, schema, cached_at)
        VALUES (?, ?, ?)
        ON CONFLICT(survey_id) DO UPDATE SET
            schema = excluded.schema,
            cached_at = excluded.cached_at
        "#,
    )
    .bind(&schema.survey_id)
    .bind(&body)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a cached schema by survey id
pub async fn get_schema(pool: &SqlitePool, survey_id: &str) -> Result<Option<SurveySchema>> {
    let body: Option<String> =
        sqlx::query_scalar("SELECT schema FROM survey_schemas WHERE survey_id = ?")
            .bind(survey_id)
            .fetch_optional(pool)
            .await?;

    body.map(|b| {
        serde_json::from_str(&b)
            .map_err(|e| Error::Internal(format!("Failed to deserialize schema: {}", e)))
    })
    .transpose()
}
