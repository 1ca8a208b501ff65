//! Sync coordinator
//!
//! Walks the pending queue one record at a time and drives each through
//! submit -> attach-media -> verify -> finalize. Exactly one run may be
//! active; records complete (success or failure) in queue order, and every
//! state change is durable the moment its own step completes, so partial
//! runs are always safe to resume.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use canvass_common::events::{EventBus, SyncEvent, SyncStage};

use crate::api::SyncApi;
use crate::db;
use crate::error::{FailureClass, SyncError};
use crate::models::{AnswerEntry, AudioUploadStatus, InterviewRecord, RecordStatus};
use crate::services::{AttachmentUploader, RecordSubmitter, ResponseBuilder, VerificationGate};

/// Tunable engine policy
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Consecutive-failure ceiling for transient/server-class failures
    pub transient_max_attempts: u32,
    /// Consecutive-failure ceiling for verification mismatches
    pub verification_max_attempts: u32,
    /// In-run attempt ceiling for one attachment upload
    pub upload_max_attempts: u32,
    /// Pause before the post-upload read-back
    pub verify_settle: std::time::Duration,
    /// Cap on uploader inter-attempt sleeps; tests set this near zero
    pub upload_retry_delay_cap: Option<std::time::Duration>,
    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            transient_max_attempts: 10,
            verification_max_attempts: 10,
            upload_max_attempts: 5,
            verify_settle: std::time::Duration::from_secs(2),
            upload_retry_delay_cap: None,
            event_capacity: 256,
        }
    }
}

impl SyncPolicy {
    /// Consecutive-failure ceiling for a class; zero means no retry at all
    fn ceiling(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::Transient => self.transient_max_attempts,
            FailureClass::VerificationFailed => self.verification_max_attempts,
            _ => 0,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Processed the queue (possibly with per-record failures)
    Completed,
    /// Another run was already in progress; nothing was touched
    Busy,
    /// Device offline; nothing was touched
    Offline,
    /// Queue was empty; only the last-sync marker was updated
    NothingToSync,
}

/// Per-record failure detail surfaced to callers
#[derive(Debug, Clone)]
pub struct RecordError {
    /// None for run-level failures (e.g. the queue could not be read)
    pub record_id: Option<Uuid>,
    pub error: String,
}

/// Result of one `run_sync` call
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub status: RunStatus,
    pub success: bool,
    pub synced_count: usize,
    pub failed_count: usize,
    pub errors: Vec<RecordError>,
}

impl SyncResult {
    fn short_circuit(status: RunStatus) -> Self {
        Self {
            status,
            success: true,
            synced_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        }
    }
}

/// The offline-first interview sync engine
pub struct SyncEngine<A: SyncApi> {
    pool: SqlitePool,
    api: A,
    event_bus: EventBus,
    /// Single-flight guard: held for the duration of one run
    run_lock: Mutex<()>,
    policy: SyncPolicy,
    builder: ResponseBuilder,
    submitter: RecordSubmitter,
    uploader: AttachmentUploader,
    gate: VerificationGate,
}

impl<A: SyncApi> SyncEngine<A> {
    pub fn new(pool: SqlitePool, api: A, policy: SyncPolicy) -> Self {
        let uploader =
            AttachmentUploader::new(policy.upload_max_attempts, policy.upload_retry_delay_cap);
        let gate = VerificationGate::new(policy.verify_settle);
        Self {
            pool,
            api,
            event_bus: EventBus::new(policy.event_capacity),
            run_lock: Mutex::new(()),
            policy,
            builder: ResponseBuilder::new(),
            submitter: RecordSubmitter::new(),
            uploader,
            gate,
        }
    }

    /// Subscribe to sync progress events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_bus.subscribe()
    }

    /// Whether a sync run is currently active
    pub fn is_sync_in_progress(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Run one pass over the pending queue
    ///
    /// Returns immediately with `Busy` if a run is active and `Offline` if
    /// the server is unreachable; neither path mutates any record.
    pub async fn run_sync(&self) -> SyncResult {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Sync already in progress, returning busy");
                return SyncResult::short_circuit(RunStatus::Busy);
            }
        };

        // Connectivity gate: no record mutation when offline, not even
        // attempt counters
        if !self.api.is_reachable().await {
            info!("Device offline, skipping sync run");
            return SyncResult::short_circuit(RunStatus::Offline);
        }

        match self.run_locked().await {
            Ok(result) => result,
            Err(e) => {
                // Fatal run-level error; per-record state already written is
                // durable and the next run resumes from it
                error!(error = %e, "Sync run aborted");
                SyncResult {
                    status: RunStatus::Completed,
                    success: false,
                    synced_count: 0,
                    failed_count: 0,
                    errors: vec![RecordError {
                        record_id: None,
                        error: e.to_string(),
                    }],
                }
            }
        }
    }

    async fn run_locked(&self) -> Result<SyncResult, SyncError> {
        let requeued = db::records::requeue_stuck_syncing(&self.pool).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued records left mid-flight by a previous run");
        }

        let queue = db::records::get_pending_records(&self.pool).await?;

        if queue.is_empty() {
            // Nothing to do; don't issue noisy network calls
            db::records::update_last_sync_time(&self.pool).await?;
            return Ok(SyncResult::short_circuit(RunStatus::NothingToSync));
        }

        let total = queue.len();
        info!(total, "Starting sync run");
        self.event_bus.emit_lossy(SyncEvent::SyncRunStarted {
            total,
            timestamp: Utc::now(),
        });

        let mut result = SyncResult {
            status: RunStatus::Completed,
            success: true,
            synced_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        };

        for (index, record) in queue.into_iter().enumerate() {
            let record_id = record.id;
            match self
                .process_record(record, index, total, &result)
                .await
            {
                Ok(duplicate) => {
                    result.synced_count += 1;
                    self.event_bus.emit_lossy(SyncEvent::RecordSynced {
                        record_id,
                        duplicate,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) if FailureClass::of(&e) == FailureClass::Duplicate => {
                    // Duplicate sentinel surfaced as an error path: still a
                    // successful idempotent delivery
                    if let Err(e) =
                        db::records::set_status(&self.pool, record_id, RecordStatus::Synced, None)
                            .await
                    {
                        warn!(record_id = %record_id, error = %e, "Failed to mark duplicate synced");
                    }
                    result.synced_count += 1;
                    self.event_bus.emit_lossy(SyncEvent::RecordSynced {
                        record_id,
                        duplicate: true,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    let class = self.handle_failure(record_id, &e).await;
                    result.failed_count += 1;
                    result.success = false;
                    result.errors.push(RecordError {
                        record_id: Some(record_id),
                        error: e.to_string(),
                    });
                    self.event_bus.emit_lossy(SyncEvent::RecordFailed {
                        record_id,
                        failure_class: class.to_string(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        db::records::update_last_sync_time(&self.pool).await?;

        info!(
            synced = result.synced_count,
            failed = result.failed_count,
            "Sync run completed"
        );
        self.event_bus.emit_lossy(SyncEvent::SyncRunCompleted {
            synced_count: result.synced_count,
            failed_count: result.failed_count,
            success: result.success,
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    /// Drive one record through the full protocol
    ///
    /// Returns whether the server reported an idempotent duplicate.
    async fn process_record(
        &self,
        mut record: InterviewRecord,
        index: usize,
        total: usize,
        tally: &SyncResult,
    ) -> Result<bool, SyncError> {
        if !record.status.can_transition(RecordStatus::Syncing) {
            return Err(SyncError::InvalidTransition {
                from: record.status.to_string(),
                to: RecordStatus::Syncing.to_string(),
            });
        }
        db::records::set_status(&self.pool, record.id, RecordStatus::Syncing, None).await?;
        record.status = RecordStatus::Syncing;

        self.progress(&record, index, total, 0, SyncStage::UploadingData, tally)
            .await;

        let answers = self.canonical_answers(&record).await?;

        let duplicate = self
            .submitter
            .submit(&self.pool, &self.api, &mut record, answers)
            .await?;

        self.progress(&record, index, total, 50, SyncStage::UploadingData, tally)
            .await;

        if record.has_audio() {
            self.sync_audio(&mut record, index, total, tally).await?;
        }

        // Finalize: server identifier present and, if audio exists, the
        // verification gate has passed
        db::records::update_metadata_and_status(
            &self.pool,
            record.id,
            &record.metadata,
            RecordStatus::Synced,
        )
        .await?;
        record.status = RecordStatus::Synced;
        self.progress(&record, index, total, 100, SyncStage::Synced, tally)
            .await;

        self.cleanup(&record).await;

        Ok(duplicate)
    }

    /// Resolve the canonical answer list for submission
    async fn canonical_answers(
        &self,
        record: &InterviewRecord,
    ) -> Result<Vec<AnswerEntry>, SyncError> {
        // Already-submitted records skip straight past answer building
        if record.metadata.is_submitted() {
            return Ok(Vec::new());
        }

        if let Some(answers) = &record.answers {
            if !answers.is_empty() {
                return Ok(answers.clone());
            }
        }

        let schema = db::surveys::get_schema(&self.pool, &record.survey_id)
            .await?
            .ok_or_else(|| SyncError::SchemaMissing {
                survey_id: record.survey_id.clone(),
            })?;

        self.builder.build(record, &schema)
    }

    /// Upload and verify the audio attachment
    async fn sync_audio(
        &self,
        record: &mut InterviewRecord,
        index: usize,
        total: usize,
        tally: &SyncResult,
    ) -> Result<(), SyncError> {
        // Verified on a previous pass: nothing to do, not even a read
        if record.audio_upload_status == AudioUploadStatus::Uploaded
            && record.metadata.audio_reference.is_some()
        {
            return Ok(());
        }

        self.progress(record, index, total, 55, SyncStage::UploadingAudio, tally)
            .await;

        db::records::update_audio_state(
            &self.pool,
            record.id,
            AudioUploadStatus::Uploading,
            &record.metadata,
        )
        .await?;
        record.audio_upload_status = AudioUploadStatus::Uploading;

        let upload = self.uploader.upload(&self.api, record).await;
        if let Err(e) = upload {
            db::records::update_audio_state(
                &self.pool,
                record.id,
                AudioUploadStatus::Failed,
                &record.metadata,
            )
            .await?;
            record.audio_upload_status = AudioUploadStatus::Failed;
            return Err(e);
        }

        self.progress(record, index, total, 90, SyncStage::UploadingAudio, tally)
            .await;
        self.progress(record, index, total, 95, SyncStage::Verifying, tally)
            .await;

        // Read-after-write: the upload call's 200 is not durability
        match self.gate.confirm(&self.api, record).await {
            Ok(reference) => {
                record.metadata.audio_reference = Some(reference);
                record.metadata.needs_audio_retry = false;
                db::records::update_audio_state(
                    &self.pool,
                    record.id,
                    AudioUploadStatus::Uploaded,
                    &record.metadata,
                )
                .await?;
                record.audio_upload_status = AudioUploadStatus::Uploaded;
                Ok(())
            }
            Err(e) => {
                db::records::update_audio_state(
                    &self.pool,
                    record.id,
                    AudioUploadStatus::Failed,
                    &record.metadata,
                )
                .await?;
                record.audio_upload_status = AudioUploadStatus::Failed;
                Err(e)
            }
        }
    }

    /// Delete record and attachment, honoring the no-data-loss invariant
    async fn cleanup(&self, record: &InterviewRecord) {
        if !record.is_safe_to_delete() {
            // Duplicate outcome with unverified audio lands here; the record
            // stays until a later pass gets the audio through the gate
            warn!(
                record_id = %record.id,
                "Record synced but attachment not verified; keeping local copy"
            );
            return;
        }

        if let Err(e) = db::records::delete_record(&self.pool, record.id).await {
            warn!(record_id = %record.id, error = %e, "Failed to delete synced record");
            return;
        }

        if let Some(path) = &record.audio_offline_path {
            if record.audio_upload_status == AudioUploadStatus::Uploaded {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(
                        record_id = %record.id,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete local audio file"
                    );
                }
            }
        }

        info!(record_id = %record.id, "Record delivered and cleaned up");
    }

    /// Classify a failure, bump the attempt counter, and pick the next state
    async fn handle_failure(&self, record_id: Uuid, err: &SyncError) -> FailureClass {
        let class = FailureClass::of(err);

        let attempts = match db::records::get_record(&self.pool, record_id).await {
            Ok(Some(record)) => record.sync_attempts + 1,
            _ => 1,
        };

        let next_status = if !class.is_retryable() || attempts > self.policy.ceiling(class) {
            RecordStatus::FailedPermanently
        } else {
            RecordStatus::Failed
        };

        if next_status == RecordStatus::FailedPermanently {
            error!(
                record_id = %record_id,
                class = %class,
                attempts,
                error = %err,
                "Record permanently failed; manual intervention required"
            );
        } else {
            warn!(
                record_id = %record_id,
                class = %class,
                attempts,
                error = %err,
                "Record sync attempt failed, will retry"
            );
        }

        if let Err(e) = db::records::record_failure(
            &self.pool,
            record_id,
            attempts,
            class,
            &err.to_string(),
            next_status,
        )
        .await
        {
            error!(record_id = %record_id, error = %e, "Failed to persist failure state");
        }

        class
    }

    /// Publish staged progress to the bus and persist it on the record
    async fn progress(
        &self,
        record: &InterviewRecord,
        index: usize,
        total: usize,
        percent: u8,
        stage: SyncStage,
        tally: &SyncResult,
    ) {
        if let Err(e) =
            db::records::update_sync_progress(&self.pool, record.id, percent, stage).await
        {
            tracing::debug!(record_id = %record.id, error = %e, "Progress write failed");
        }

        self.event_bus.emit_lossy(SyncEvent::RecordProgress {
            current_index: index,
            total,
            record_id: record.id,
            percent,
            stage,
            synced_count: tally.synced_count,
            failed_count: tally.failed_count,
            timestamp: Utc::now(),
        });
    }
}
