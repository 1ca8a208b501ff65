//! Record submission with idempotency
//!
//! A record that already carries a server identifier is never submitted
//! again; the identifiers returned by a successful (or duplicate) submission
//! are persisted atomically with the record status before any further step,
//! so a crash immediately afterwards still lets the next run detect
//! completion.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::api::{RecordPayload, SubmitOutcome, SyncApi};
use crate::db;
use crate::error::SyncError;
use crate::models::{AnswerEntry, InterviewRecord, RecordStatus};

/// Submits one interview's structured data and classifies the outcome
pub struct RecordSubmitter;

impl RecordSubmitter {
    pub fn new() -> Self {
        Self
    }

    /// Submit `record` unless it was already delivered
    ///
    /// Returns `true` when the server reported an idempotent duplicate.
    /// Mutates the in-memory record and persists its metadata on success.
    pub async fn submit<A: SyncApi + ?Sized>(
        &self,
        pool: &SqlitePool,
        api: &A,
        record: &mut InterviewRecord,
        answers: Vec<AnswerEntry>,
    ) -> Result<bool, SyncError> {
        // Idempotency precondition: once an identifier is recorded, no
        // further create-record call may be issued
        if record.metadata.is_submitted() {
            debug!(
                record_id = %record.id,
                server_id = record.metadata.server_id(),
                "Record already submitted, skipping create call"
            );
            return Ok(false);
        }

        let payload = RecordPayload {
            survey_id: record.survey_id.clone(),
            answers,
            started_at: record.metadata.started_at,
            ended_at: record.metadata.ended_at,
            device_id: record.metadata.device_id.clone(),
            location: record.metadata.location.clone(),
            completed: record.metadata.completed,
            abandoned: record.metadata.abandoned,
        };

        let outcome = api.submit_record(&record.session_id, &payload).await?;

        let (remote, duplicate) = match outcome {
            SubmitOutcome::Created(remote) => (Some(remote), false),
            SubmitOutcome::Duplicate(remote) => (remote, true),
        };

        if let Some(remote) = remote {
            record.metadata.server_response_id = remote.response_id;
            record.metadata.server_storage_id = remote.storage_id;
            record.metadata.needs_audio_retry = record.has_audio();

            // Identifiers and status commit together; a crash after this
            // point cannot cause a second create call
            db::records::update_metadata_and_status(
                pool,
                record.id,
                &record.metadata,
                RecordStatus::Syncing,
            )
            .await?;
        }

        if duplicate {
            info!(record_id = %record.id, "Server reported duplicate; treating as delivered");
        } else {
            info!(
                record_id = %record.id,
                server_id = record.metadata.server_id(),
                "Record submitted"
            );
        }

        Ok(duplicate)
    }
}

impl Default for RecordSubmitter {
    fn default() -> Self {
        Self::new()
    }
}
