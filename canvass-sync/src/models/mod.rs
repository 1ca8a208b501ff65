//! Data model for the sync engine

pub mod record;
pub mod survey;

pub use record::{AudioUploadStatus, InterviewRecord, RecordMetadata, RecordStatus};
pub use survey::{AnswerEntry, SurveyQuestion, SurveySchema, SurveySection};
