//! Interview record: the unit of sync work
//!
//! A record is created when an interview is completed or abandoned on the
//! device, mutated only by the sync engine during a sync attempt, and deleted
//! only after the verification gate has confirmed server-side durability (or
//! immediately for confirmed duplicates without pending audio).

use crate::error::FailureClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Per-record sync lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
    FailedPermanently,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Syncing => "syncing",
            RecordStatus::Synced => "synced",
            RecordStatus::Failed => "failed",
            RecordStatus::FailedPermanently => "failed_permanently",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecordStatus::Pending),
            "syncing" => Some(RecordStatus::Syncing),
            "synced" => Some(RecordStatus::Synced),
            "failed" => Some(RecordStatus::Failed),
            "failed_permanently" => Some(RecordStatus::FailedPermanently),
            _ => None,
        }
    }

    /// Legal state transitions
    ///
    /// `Syncing -> Pending` exists only for the crash-recovery sweep: records
    /// left mid-flight by a killed process are requeued before the next run.
    pub fn can_transition(&self, next: RecordStatus) -> bool {
        use RecordStatus::*;
        matches!(
            (self, next),
            (Pending, Syncing)
                | (Failed, Syncing)
                | (Syncing, Synced)
                | (Syncing, Failed)
                | (Syncing, FailedPermanently)
                | (Syncing, Pending)
        )
    }

    /// Terminal states require external intervention (re-capture/escalation)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::FailedPermanently)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload state of the optional audio attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioUploadStatus {
    None,
    Uploading,
    Uploaded,
    Failed,
}

impl AudioUploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioUploadStatus::None => "none",
            AudioUploadStatus::Uploading => "uploading",
            AudioUploadStatus::Uploaded => "uploaded",
            AudioUploadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(AudioUploadStatus::None),
            "uploading" => Some(AudioUploadStatus::Uploading),
            "uploaded" => Some(AudioUploadStatus::Uploaded),
            "failed" => Some(AudioUploadStatus::Failed),
            _ => None,
        }
    }
}

/// Typed record metadata
///
/// Once submission succeeds, the server identifiers land here; their presence
/// is the idempotency precondition that blocks any further create-record call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Interview timing
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Capture device identifier
    pub device_id: Option<String>,
    /// Free-text capture location
    pub location: Option<String>,
    /// Interview reached its natural end
    #[serde(default)]
    pub completed: bool,
    /// Interview was abandoned partway
    #[serde(default)]
    pub abandoned: bool,
    /// Server-issued human-facing response identifier (UUID)
    pub server_response_id: Option<String>,
    /// Server-internal storage key for the same record
    pub server_storage_id: Option<String>,
    /// Verified server-side audio attachment reference
    pub audio_reference: Option<String>,
    /// Data submitted but audio still outstanding; next pass skips submit
    #[serde(default)]
    pub needs_audio_retry: bool,
}

impl RecordMetadata {
    /// Any server identifier usable for verification reads
    pub fn server_id(&self) -> Option<&str> {
        self.server_response_id
            .as_deref()
            .or(self.server_storage_id.as_deref())
    }

    /// Submission already succeeded for this record
    pub fn is_submitted(&self) -> bool {
        self.server_id().is_some()
    }
}

/// One captured interview awaiting (or having completed) delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRecord {
    /// Client-local identifier, stable for the record's lifetime
    pub id: Uuid,
    pub survey_id: String,
    /// Locally generated placeholder or server-issued session identifier
    pub session_id: String,
    /// Raw captured answers keyed by question id
    pub responses: serde_json::Map<String, serde_json::Value>,
    /// Canonical answer list persisted at interview completion; authoritative
    /// when present, schema reconstruction is only a fallback
    pub answers: Option<Vec<super::survey::AnswerEntry>>,
    pub metadata: RecordMetadata,
    /// Local path of the captured audio attachment, if any
    pub audio_offline_path: Option<PathBuf>,
    pub audio_upload_status: AudioUploadStatus,
    pub status: RecordStatus,
    /// Monotonically increasing failure counter for ceiling decisions
    pub sync_attempts: u32,
    pub last_error: Option<String>,
    pub last_failure_class: Option<FailureClass>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewRecord {
    /// New pending record, as the capture layer creates it
    pub fn new(survey_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            survey_id: survey_id.into(),
            session_id: session_id.into(),
            responses: serde_json::Map::new(),
            answers: None,
            metadata: RecordMetadata::default(),
            audio_offline_path: None,
            audio_upload_status: AudioUploadStatus::None,
            status: RecordStatus::Pending,
            sync_attempts: 0,
            last_error: None,
            last_failure_class: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record carries an audio attachment
    pub fn has_audio(&self) -> bool {
        self.audio_offline_path.is_some()
    }

    /// Local deletion is allowed only when no attachment exists, or the
    /// attachment passed the verification gate. This is the no-data-loss
    /// invariant; nothing else may delete a record.
    pub fn is_safe_to_delete(&self) -> bool {
        match &self.audio_offline_path {
            None => true,
            Some(_) => {
                self.audio_upload_status == AudioUploadStatus::Uploaded
                    && self.metadata.audio_reference.is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Syncing,
            RecordStatus::Synced,
            RecordStatus::Failed,
            RecordStatus::FailedPermanently,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("bogus"), None);
    }

    #[test]
    fn test_legal_transitions() {
        use RecordStatus::*;
        assert!(Pending.can_transition(Syncing));
        assert!(Failed.can_transition(Syncing));
        assert!(Syncing.can_transition(Synced));
        assert!(Syncing.can_transition(Failed));
        assert!(Syncing.can_transition(FailedPermanently));
        // Recovery sweep
        assert!(Syncing.can_transition(Pending));
    }

    #[test]
    fn test_illegal_transitions() {
        use RecordStatus::*;
        assert!(!Pending.can_transition(Synced));
        assert!(!Pending.can_transition(Failed));
        assert!(!Synced.can_transition(Syncing));
        assert!(!FailedPermanently.can_transition(Syncing));
        assert!(!Failed.can_transition(Synced));
        assert!(FailedPermanently.is_terminal());
    }

    #[test]
    fn test_delete_gate_requires_verified_audio() {
        let mut record = InterviewRecord::new("survey-1", "session-1");
        assert!(record.is_safe_to_delete());

        record.audio_offline_path = Some(PathBuf::from("/data/audio/a.m4a"));
        assert!(!record.is_safe_to_delete());

        // Upload reported success but not verified yet
        record.audio_upload_status = AudioUploadStatus::Uploaded;
        record.metadata.audio_reference = None;
        assert!(!record.is_safe_to_delete());

        record.metadata.audio_reference = Some("att-123".to_string());
        assert!(record.is_safe_to_delete());
    }

    #[test]
    fn test_server_id_prefers_response_id() {
        let mut meta = RecordMetadata::default();
        assert!(!meta.is_submitted());

        meta.server_storage_id = Some("65f0aa".to_string());
        assert_eq!(meta.server_id(), Some("65f0aa"));

        meta.server_response_id = Some("uuid-1".to_string());
        assert_eq!(meta.server_id(), Some("uuid-1"));
        assert!(meta.is_submitted());
    }
}
