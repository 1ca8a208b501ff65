//! HTTP implementation of the collection-server API
//!
//! All duplicate/conflict detection lives in `map_submit_response`: HTTP 409,
//! the explicit `duplicate` contract flag, and known storage-layer
//! unique-constraint codes all collapse to `SubmitOutcome::Duplicate` here,
//! so nothing upstream ever inspects error text.

use super::{RecordPayload, RemoteRecord, SubmitOutcome, SyncApi, UploadReceipt};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const USER_AGENT: &str = concat!("canvass-sync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage-layer error codes the server surfaces for unique-key violations.
/// Legacy servers report duplicates this way instead of HTTP 409.
const DUPLICATE_ERROR_CODES: &[&str] = &["duplicate_key", "E11000", "unique_violation"];

/// Collection-server HTTP client
pub struct HttpSyncApi {
    http_client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

/// Record-creation response body
#[derive(Debug, Deserialize)]
struct SubmitResponseBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    duplicate: bool,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    record: Option<RemoteRecord>,
}

/// Attachment-upload response body
#[derive(Debug, Deserialize)]
struct UploadResponseBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Read-by-id response body
#[derive(Debug, Deserialize)]
struct FetchResponseBody {
    #[serde(default)]
    record: Option<RemoteRecord>,
}

impl HttpSyncApi {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

/// Map a record-creation response to an outcome
///
/// Visible for unit testing; pure with respect to the wire call.
fn map_submit_response(status: u16, body: SubmitResponseBody) -> Result<SubmitOutcome, ApiError> {
    let message = body.message.clone().unwrap_or_default();

    // Conflict status, explicit flag, or storage-layer unique-constraint code
    let duplicate_code = body
        .error_code
        .as_deref()
        .map(|code| DUPLICATE_ERROR_CODES.iter().any(|d| code.contains(d)))
        .unwrap_or(false);
    if status == 409 || body.duplicate || duplicate_code {
        return Ok(SubmitOutcome::Duplicate(body.record));
    }

    if status >= 500 {
        return Err(ApiError::Server { status, message });
    }
    if status >= 400 {
        return Err(ApiError::Validation { status, message });
    }

    if !body.success {
        return Err(ApiError::Contract(format!(
            "2xx submit response with success=false: {message}"
        )));
    }

    // A success response without the identifier is a contract violation, not
    // a success
    match body.record {
        Some(record) if record.server_id().is_some() => Ok(SubmitOutcome::Created(record)),
        _ => Err(ApiError::Contract(
            "submit response missing record identifier".to_string(),
        )),
    }
}

fn map_upload_response(status: u16, body: UploadResponseBody) -> Result<UploadReceipt, ApiError> {
    let message = body.message.clone().unwrap_or_default();

    if status >= 500 {
        return Err(ApiError::Server { status, message });
    }
    if status >= 400 {
        return Err(ApiError::Validation { status, message });
    }

    match body.reference {
        Some(reference) if body.success && !reference.trim().is_empty() => Ok(UploadReceipt {
            reference,
            size_bytes: body.size.unwrap_or(0),
        }),
        _ => Err(ApiError::Contract(
            "upload response missing attachment reference".to_string(),
        )),
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn is_reachable(&self) -> bool {
        let result = self
            .http_client
            .get(self.url("/health"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    async fn submit_record(
        &self,
        session_id: &str,
        payload: &RecordPayload,
    ) -> Result<SubmitOutcome, ApiError> {
        let url = self.url(&format!("/api/v1/sessions/{session_id}/responses"));
        tracing::debug!(session_id, survey_id = %payload.survey_id, "Submitting record");

        let response = self
            .request(self.http_client.post(&url))
            .json(payload)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let body: SubmitResponseBody = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        map_submit_response(status, body)
    }

    async fn upload_attachment(
        &self,
        path: &Path,
        session_id: &str,
        survey_id: &str,
        linked_record_id: Option<&str>,
    ) -> Result<UploadReceipt, ApiError> {
        let url = self.url(&format!("/api/v1/sessions/{session_id}/audio"));

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Network(format!("read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.bin".to_string());

        tracing::debug!(
            session_id,
            survey_id,
            file = %path.display(),
            size = bytes.len(),
            "Uploading attachment"
        );

        let mut form = reqwest::multipart::Form::new()
            .text("survey_id", survey_id.to_string())
            .part(
                "audio",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if let Some(record_id) = linked_record_id {
            form = form.text("record_id", record_id.to_string());
        }

        let response = self
            .request(self.http_client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let body: UploadResponseBody = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        map_upload_response(status, body)
    }

    async fn fetch_record(&self, server_id: &str) -> Result<Option<RemoteRecord>, ApiError> {
        let url = self.url(&format!("/api/v1/responses/{server_id}"));

        let response = self
            .request(self.http_client.get(&url))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Validation {
                status: status.as_u16(),
                message,
            });
        }

        let body: FetchResponseBody = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(body.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(response_id: Option<&str>) -> Option<RemoteRecord> {
        Some(RemoteRecord {
            response_id: response_id.map(str::to_string),
            storage_id: None,
            audio_reference: None,
        })
    }

    #[test]
    fn test_created_with_identifier() {
        let body = SubmitResponseBody {
            success: true,
            duplicate: false,
            error_code: None,
            message: None,
            record: record(Some("resp-1")),
        };
        match map_submit_response(201, body).unwrap() {
            SubmitOutcome::Created(r) => assert_eq!(r.server_id(), Some("resp-1")),
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_status_is_duplicate() {
        let body = SubmitResponseBody {
            success: false,
            duplicate: false,
            error_code: None,
            message: Some("already exists".into()),
            record: record(Some("resp-1")),
        };
        assert!(matches!(
            map_submit_response(409, body).unwrap(),
            SubmitOutcome::Duplicate(Some(_))
        ));
    }

    #[test]
    fn test_explicit_duplicate_flag() {
        let body = SubmitResponseBody {
            success: true,
            duplicate: true,
            error_code: None,
            message: None,
            record: None,
        };
        assert!(matches!(
            map_submit_response(200, body).unwrap(),
            SubmitOutcome::Duplicate(None)
        ));
    }

    #[test]
    fn test_unique_constraint_code_is_duplicate() {
        let body = SubmitResponseBody {
            success: false,
            duplicate: false,
            error_code: Some("E11000 duplicate key".into()),
            message: None,
            record: None,
        };
        assert!(matches!(
            map_submit_response(500, body).unwrap(),
            SubmitOutcome::Duplicate(None)
        ));
    }

    #[test]
    fn test_5xx_is_server_error() {
        let body = SubmitResponseBody {
            success: false,
            duplicate: false,
            error_code: None,
            message: Some("upstream timeout".into()),
            record: None,
        };
        assert!(matches!(
            map_submit_response(503, body),
            Err(ApiError::Server { status: 503, .. })
        ));
    }

    #[test]
    fn test_4xx_is_validation_error() {
        let body = SubmitResponseBody {
            success: false,
            duplicate: false,
            error_code: None,
            message: Some("answers required".into()),
            record: None,
        };
        assert!(matches!(
            map_submit_response(422, body),
            Err(ApiError::Validation { status: 422, .. })
        ));
    }

    #[test]
    fn test_success_without_identifier_is_contract_violation() {
        let body = SubmitResponseBody {
            success: true,
            duplicate: false,
            error_code: None,
            message: None,
            record: record(None),
        };
        assert!(matches!(
            map_submit_response(200, body),
            Err(ApiError::Contract(_))
        ));
    }

    #[test]
    fn test_upload_without_reference_fails() {
        let body = UploadResponseBody {
            success: true,
            reference: None,
            size: Some(10),
            message: None,
        };
        assert!(matches!(
            map_upload_response(200, body),
            Err(ApiError::Contract(_))
        ));

        let body = UploadResponseBody {
            success: true,
            reference: Some("  ".into()),
            size: None,
            message: None,
        };
        assert!(map_upload_response(200, body).is_err());
    }

    #[test]
    fn test_upload_receipt() {
        let body = UploadResponseBody {
            success: true,
            reference: Some("att-9".into()),
            size: Some(2048),
            message: None,
        };
        let receipt = map_upload_response(201, body).unwrap();
        assert_eq!(receipt.reference, "att-9");
        assert_eq!(receipt.size_bytes, 2048);
    }
}
