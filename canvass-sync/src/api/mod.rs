//! Remote collection-server API seam
//!
//! The engine talks to the server exclusively through the `SyncApi` trait;
//! `HttpSyncApi` is the production implementation, tests substitute mocks.

pub mod client;

pub use client::HttpSyncApi;

use crate::error::ApiError;
use crate::models::survey::AnswerEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Structured interview data submitted to the record-creation endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RecordPayload {
    pub survey_id: String,
    pub answers: Vec<AnswerEntry>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub location: Option<String>,
    pub completed: bool,
    pub abandoned: bool,
}

/// The server's canonical view of a submitted record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Human-facing response identifier (UUID)
    pub response_id: Option<String>,
    /// Server-internal storage key
    pub storage_id: Option<String>,
    /// Attachment reference, present once the audio is durably linked
    pub audio_reference: Option<String>,
}

impl RemoteRecord {
    /// Identifier usable for later verification reads
    pub fn server_id(&self) -> Option<&str> {
        self.response_id.as_deref().or(self.storage_id.as_deref())
    }
}

/// Outcome of a record-creation call
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// First-time creation
    Created(RemoteRecord),
    /// The record already exists server-side; idempotent no-op. The server
    /// may or may not echo the existing record's identifiers.
    Duplicate(Option<RemoteRecord>),
}

/// Result of a successful attachment upload call
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Server-side attachment reference
    pub reference: String,
    /// Bytes the server reports having stored
    pub size_bytes: u64,
}

/// Remote API consumed by the sync engine
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Cheap connectivity probe; a sync run is skipped entirely when offline
    async fn is_reachable(&self) -> bool;

    /// Submit one interview's structured data
    async fn submit_record(
        &self,
        session_id: &str,
        payload: &RecordPayload,
    ) -> Result<SubmitOutcome, ApiError>;

    /// Upload one binary attachment tied to a record
    async fn upload_attachment(
        &self,
        path: &Path,
        session_id: &str,
        survey_id: &str,
        linked_record_id: Option<&str>,
    ) -> Result<UploadReceipt, ApiError>;

    /// Read back the canonical record by server identifier
    ///
    /// Returns `Ok(None)` when the server does not know the identifier.
    async fn fetch_record(&self, server_id: &str) -> Result<Option<RemoteRecord>, ApiError>;
}
