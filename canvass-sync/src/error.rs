//! Sync engine error types and failure classification
//!
//! Every failure surfaced by a sub-component flows through `FailureClass::of`
//! exactly once, in the coordinator. The classification is a closed enum; no
//! caller scans error message strings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Remote API transport and contract errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout: the server is unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx-class response: the server is up but unhealthy
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 4xx-class response other than conflict: the payload was rejected
    #[error("Validation error {status}: {message}")]
    Validation { status: u16, message: String },

    /// A "successful" response violating the API contract, e.g. a 2xx create
    /// response missing the record identifier
    #[error("API contract violation: {0}")]
    Contract(String),

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors raised while syncing one record
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] canvass_common::Error),

    /// Raw responses map empty or malformed; submission would mask data loss
    #[error("Record {record_id} has no usable responses")]
    EmptyResponses { record_id: Uuid },

    /// No cached schema to reconstruct canonical answers from
    #[error("No cached schema for survey {survey_id}")]
    SchemaMissing { survey_id: String },

    /// Attachment file gone from local storage
    #[error("Audio file missing: {}", path.display())]
    AudioMissing { path: PathBuf },

    /// Attachment file exists but is zero bytes
    #[error("Audio file empty: {}", path.display())]
    AudioEmpty { path: PathBuf },

    /// Upload call returned success but the server read-back lacks the
    /// attachment reference
    #[error("Audio reference for record {record_id} not present on server copy {server_id}")]
    VerificationFailed { record_id: Uuid, server_id: String },

    /// Server reported the record already exists; treated as success upstream
    #[error("Record {record_id} already submitted")]
    DuplicateSubmission { record_id: Uuid },

    /// Attempted an illegal state-machine transition
    #[error("Illegal record transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Closed failure taxonomy driving retry and state decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Idempotent no-op; converted to success
    Duplicate,
    /// Expected to resolve; retried with the longer backoff and ceiling
    Transient,
    /// Will not heal on retry; permanently failed immediately
    Permanent,
    /// Upload reported success but read-back disagrees; always retryable
    VerificationFailed,
    /// Missing/empty local file; retry cannot fix it
    LocalIntegrity,
}

impl FailureClass {
    /// Classify a sync error. The single classification point for the engine.
    pub fn of(err: &SyncError) -> FailureClass {
        match err {
            SyncError::Api(ApiError::Network(_)) => FailureClass::Transient,
            SyncError::Api(ApiError::Server { .. }) => FailureClass::Transient,
            SyncError::Api(ApiError::Validation { .. }) => FailureClass::Permanent,
            SyncError::Api(ApiError::Contract(_)) => FailureClass::Permanent,
            SyncError::Api(ApiError::Parse(_)) => FailureClass::Permanent,
            // Local store contention resolves on a later pass
            SyncError::Store(_) => FailureClass::Transient,
            SyncError::EmptyResponses { .. } => FailureClass::Permanent,
            SyncError::SchemaMissing { .. } => FailureClass::Permanent,
            SyncError::AudioMissing { .. } => FailureClass::LocalIntegrity,
            SyncError::AudioEmpty { .. } => FailureClass::LocalIntegrity,
            SyncError::VerificationFailed { .. } => FailureClass::VerificationFailed,
            SyncError::DuplicateSubmission { .. } => FailureClass::Duplicate,
            SyncError::InvalidTransition { .. } => FailureClass::Permanent,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Transient | FailureClass::VerificationFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Duplicate => "duplicate",
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
            FailureClass::VerificationFailed => "verification_failed",
            FailureClass::LocalIntegrity => "local_integrity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "duplicate" => Some(FailureClass::Duplicate),
            "transient" => Some(FailureClass::Transient),
            "permanent" => Some(FailureClass::Permanent),
            "verification_failed" => Some(FailureClass::VerificationFailed),
            "local_integrity" => Some(FailureClass::LocalIntegrity),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_server_errors_are_transient() {
        let err = SyncError::Api(ApiError::Network("connection refused".into()));
        assert_eq!(FailureClass::of(&err), FailureClass::Transient);

        let err = SyncError::Api(ApiError::Server {
            status: 503,
            message: "maintenance".into(),
        });
        assert_eq!(FailureClass::of(&err), FailureClass::Transient);
        assert!(FailureClass::of(&err).is_retryable());
    }

    #[test]
    fn test_validation_and_contract_errors_are_permanent() {
        let err = SyncError::Api(ApiError::Validation {
            status: 422,
            message: "bad payload".into(),
        });
        assert_eq!(FailureClass::of(&err), FailureClass::Permanent);
        assert!(!FailureClass::of(&err).is_retryable());

        let err = SyncError::Api(ApiError::Contract("missing response id".into()));
        assert_eq!(FailureClass::of(&err), FailureClass::Permanent);
    }

    #[test]
    fn test_local_file_problems_never_retry() {
        let err = SyncError::AudioMissing {
            path: PathBuf::from("/gone.m4a"),
        };
        assert_eq!(FailureClass::of(&err), FailureClass::LocalIntegrity);
        assert!(!FailureClass::of(&err).is_retryable());
    }

    #[test]
    fn test_verification_mismatch_is_always_retryable() {
        let err = SyncError::VerificationFailed {
            record_id: Uuid::new_v4(),
            server_id: "r-1".into(),
        };
        assert_eq!(FailureClass::of(&err), FailureClass::VerificationFailed);
        assert!(FailureClass::of(&err).is_retryable());
    }

    #[test]
    fn test_duplicate_sentinel_classifies_as_duplicate() {
        let err = SyncError::DuplicateSubmission {
            record_id: Uuid::new_v4(),
        };
        assert_eq!(FailureClass::of(&err), FailureClass::Duplicate);
    }

    #[test]
    fn test_class_round_trip() {
        for class in [
            FailureClass::Duplicate,
            FailureClass::Transient,
            FailureClass::Permanent,
            FailureClass::VerificationFailed,
            FailureClass::LocalIntegrity,
        ] {
            assert_eq!(FailureClass::parse(class.as_str()), Some(class));
        }
    }
}
