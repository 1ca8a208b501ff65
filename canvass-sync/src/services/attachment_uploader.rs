//! Audio attachment upload with bounded retry
//!
//! Stateless with respect to the overall sync: takes a record and returns a
//! receipt or the last failure. Deciding what to delete is the coordinator's
//! job, never the uploader's.

use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{SyncApi, UploadReceipt};
use crate::error::{ApiError, FailureClass, SyncError};
use crate::models::InterviewRecord;
use crate::utils::backoff_delay;

/// Attachment references the server must never hand back for real uploads
const PLACEHOLDER_REFERENCES: &[&str] = &["mock", "placeholder", "pending"];

pub struct AttachmentUploader {
    max_attempts: u32,
    /// Upper bound on inter-attempt sleeps; tests set this near zero
    retry_delay_cap: Option<Duration>,
}

impl AttachmentUploader {
    pub fn new(max_attempts: u32, retry_delay_cap: Option<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay_cap,
        }
    }

    /// Upload the record's attachment, retrying up to the attempt ceiling
    ///
    /// A missing or zero-byte file is a local data-integrity problem and
    /// fails immediately; retrying cannot restore a file that isn't there.
    pub async fn upload<A: SyncApi + ?Sized>(
        &self,
        api: &A,
        record: &InterviewRecord,
    ) -> Result<UploadReceipt, SyncError> {
        let path = record
            .audio_offline_path
            .as_ref()
            .ok_or_else(|| SyncError::AudioMissing {
                path: Default::default(),
            })?;

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(_) => {
                return Err(SyncError::AudioMissing { path: path.clone() });
            }
        };
        if meta.len() == 0 {
            return Err(SyncError::AudioEmpty { path: path.clone() });
        }

        let linked_record_id = record.metadata.server_id().map(str::to_string);
        let mut last_error: Option<SyncError> = None;

        for attempt in 1..=self.max_attempts {
            let result = api
                .upload_attachment(
                    path,
                    &record.session_id,
                    &record.survey_id,
                    linked_record_id.as_deref(),
                )
                .await;

            let error = match result {
                Ok(receipt) if Self::is_usable_reference(&receipt.reference) => {
                    debug!(
                        record_id = %record.id,
                        reference = %receipt.reference,
                        attempt,
                        "Attachment upload accepted"
                    );
                    return Ok(receipt);
                }
                // A "success" carrying a placeholder reference is a failure
                // for retry purposes
                Ok(receipt) => SyncError::Api(ApiError::Contract(format!(
                    "placeholder attachment reference: {}",
                    receipt.reference
                ))),
                Err(e) => SyncError::Api(e),
            };

            let class = FailureClass::of(&error);
            warn!(
                record_id = %record.id,
                attempt,
                max_attempts = self.max_attempts,
                class = %class,
                error = %error,
                "Attachment upload attempt failed"
            );
            last_error = Some(error);

            if attempt < self.max_attempts {
                let mut delay = backoff_delay(class, attempt);
                if let Some(cap) = self.retry_delay_cap {
                    delay = delay.min(cap);
                }
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Api(ApiError::Network(
            "upload failed without error detail".to_string(),
        ))))
    }

    fn is_usable_reference(reference: &str) -> bool {
        let reference = reference.trim();
        !reference.is_empty()
            && !PLACEHOLDER_REFERENCES
                .iter()
                .any(|p| reference.eq_ignore_ascii_case(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_references_rejected() {
        assert!(!AttachmentUploader::is_usable_reference(""));
        assert!(!AttachmentUploader::is_usable_reference("  "));
        assert!(!AttachmentUploader::is_usable_reference("mock"));
        assert!(!AttachmentUploader::is_usable_reference("Placeholder"));
        assert!(AttachmentUploader::is_usable_reference("att-8c21"));
    }
}
