//! Read-after-write verification of attachment linkage
//!
//! An upload call returning 200 is not durability. Before the local audio
//! file may ever be deleted, the canonical record is fetched back from the
//! server and must show the attachment reference actually persisted. This is
//! the invariant that protects the only remaining copy of respondent audio.

use std::time::Duration;
use tracing::{debug, warn};

use crate::api::SyncApi;
use crate::error::SyncError;
use crate::models::InterviewRecord;

pub struct VerificationGate {
    /// Pause before the read-back, allowing asynchronous server-side
    /// persistence to settle
    settle_delay: Duration,
}

impl VerificationGate {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Confirm the attachment reference is present on the server's canonical
    /// copy of the record; returns the verified reference
    pub async fn confirm<A: SyncApi + ?Sized>(
        &self,
        api: &A,
        record: &InterviewRecord,
    ) -> Result<String, SyncError> {
        let server_id = record
            .metadata
            .server_id()
            .ok_or_else(|| SyncError::VerificationFailed {
                record_id: record.id,
                server_id: "<none>".to_string(),
            })?
            .to_string();

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let remote = api.fetch_record(&server_id).await?;

        let reference = remote
            .as_ref()
            .and_then(|r| r.audio_reference.as_deref())
            .filter(|r| !r.trim().is_empty());

        match reference {
            Some(reference) => {
                debug!(
                    record_id = %record.id,
                    server_id = %server_id,
                    reference,
                    "Attachment reference verified on canonical record"
                );
                Ok(reference.to_string())
            }
            None => {
                warn!(
                    record_id = %record.id,
                    server_id = %server_id,
                    found_record = remote.is_some(),
                    "Upload reported success but read-back lacks attachment reference"
                );
                Err(SyncError::VerificationFailed {
                    record_id: record.id,
                    server_id,
                })
            }
        }
    }
}
