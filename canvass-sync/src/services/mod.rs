//! Sync engine services

pub mod attachment_uploader;
pub mod record_submitter;
pub mod response_builder;
pub mod sync_engine;
pub mod verification_gate;

pub use attachment_uploader::AttachmentUploader;
pub use record_submitter::RecordSubmitter;
pub use response_builder::ResponseBuilder;
pub use sync_engine::{RecordError, RunStatus, SyncEngine, SyncPolicy, SyncResult};
pub use verification_gate::VerificationGate;
