//! Canonical answer reconstruction
//!
//! The list persisted at interview completion is authoritative; rebuilding
//! from the cached schema is a fallback for records captured before the
//! client started persisting canonical answers.

use crate::error::SyncError;
use crate::models::{AnswerEntry, InterviewRecord, SurveySchema};

/// Legacy raw-response key prefixes, oldest capture formats last
const LEGACY_KEY_PREFIXES: &[&str] = &["", "q_", "question_"];

/// Builds the ordered question/answer list submitted for one interview
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Produce the canonical answer list for a record
    ///
    /// Never fabricates data: a record whose raw responses yield nothing
    /// usable is a permanent validation error, not an empty submission.
    pub fn build(
        &self,
        record: &InterviewRecord,
        schema: &SurveySchema,
    ) -> Result<Vec<AnswerEntry>, SyncError> {
        // Persisted canonical list wins
        if let Some(answers) = &record.answers {
            if !answers.is_empty() {
                return Ok(answers.clone());
            }
        }

        if record.responses.is_empty() {
            return Err(SyncError::EmptyResponses {
                record_id: record.id,
            });
        }

        let mut entries = Vec::new();
        for question in schema.questions() {
            match self.lookup_raw(record, &question.id) {
                Some(value) => entries.push(AnswerEntry {
                    question_id: question.id.clone(),
                    question_text: question.text.clone(),
                    question_type: question.question_type.clone(),
                    value: value.clone(),
                    options: question.options.clone(),
                    is_skipped: false,
                }),
                None if question.required => entries.push(AnswerEntry {
                    question_id: question.id.clone(),
                    question_text: question.text.clone(),
                    question_type: question.question_type.clone(),
                    value: serde_json::Value::Null,
                    options: question.options.clone(),
                    is_skipped: true,
                }),
                // Optional and unanswered: omitted
                None => {}
            }
        }

        // Raw values that match no schema question reconstruct to nothing;
        // submitting that would silently mask data loss
        if entries.iter().all(|e| e.is_skipped) {
            return Err(SyncError::EmptyResponses {
                record_id: record.id,
            });
        }

        Ok(entries)
    }

    /// Find a raw value by question id, trying legacy key variants
    fn lookup_raw<'a>(
        &self,
        record: &'a InterviewRecord,
        question_id: &str,
    ) -> Option<&'a serde_json::Value> {
        for prefix in LEGACY_KEY_PREFIXES {
            let key = format!("{prefix}{question_id}");
            if let Some(value) = record.responses.get(&key) {
                if !value.is_null() {
                    return Some(value);
                }
            }
        }
        None
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SurveyQuestion, SurveySection};
    use serde_json::json;

    fn schema() -> SurveySchema {
        SurveySchema {
            survey_id: "s1".into(),
            title: None,
            sections: vec![SurveySection {
                id: "sec1".into(),
                title: None,
                questions: vec![
                    SurveyQuestion {
                        id: "name".into(),
                        text: "Respondent name".into(),
                        question_type: "text".into(),
                        required: true,
                        options: vec![],
                    },
                    SurveyQuestion {
                        id: "age".into(),
                        text: "Age bracket".into(),
                        question_type: "choice".into(),
                        required: false,
                        options: vec!["18-30".into(), "31-50".into(), "51+".into()],
                    },
                    SurveyQuestion {
                        id: "consent".into(),
                        text: "Consent given".into(),
                        question_type: "bool".into(),
                        required: true,
                        options: vec![],
                    },
                ],
            }],
        }
    }

    fn record_with(responses: serde_json::Value) -> InterviewRecord {
        let mut record = InterviewRecord::new("s1", "sess-1");
        record.responses = responses.as_object().unwrap().clone();
        record
    }

    #[test]
    fn test_persisted_answers_used_verbatim() {
        let mut record = record_with(json!({ "name": "ignored" }));
        record.answers = Some(vec![AnswerEntry {
            question_id: "name".into(),
            question_text: "Respondent name".into(),
            question_type: "text".into(),
            value: json!("Ada"),
            options: vec![],
            is_skipped: false,
        }]);

        let entries = ResponseBuilder::new().build(&record, &schema()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, json!("Ada"));
    }

    #[test]
    fn test_reconstruction_in_schema_order() {
        let record = record_with(json!({
            "consent": true,
            "name": "Grace",
            "age": "31-50"
        }));

        let entries = ResponseBuilder::new().build(&record, &schema()).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.question_id.as_str()).collect();
        assert_eq!(ids, vec!["name", "age", "consent"]);
        assert!(entries.iter().all(|e| !e.is_skipped));
        assert_eq!(entries[1].options.len(), 3);
    }

    #[test]
    fn test_legacy_key_variants() {
        let record = record_with(json!({
            "q_name": "Edsger",
            "question_consent": false
        }));

        let entries = ResponseBuilder::new().build(&record, &schema()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question_id, "name");
        assert_eq!(entries[0].value, json!("Edsger"));
        assert_eq!(entries[1].question_id, "consent");
    }

    #[test]
    fn test_required_missing_emits_skipped_entry() {
        let record = record_with(json!({ "name": "Barbara" }));

        let entries = ResponseBuilder::new().build(&record, &schema()).unwrap();
        // name answered, age optional omitted, consent skipped
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].question_id, "consent");
        assert!(entries[1].is_skipped);
        assert!(entries[1].value.is_null());
    }

    #[test]
    fn test_empty_responses_is_error() {
        let record = record_with(json!({}));
        let err = ResponseBuilder::new().build(&record, &schema()).unwrap_err();
        assert!(matches!(err, SyncError::EmptyResponses { .. }));
    }

    #[test]
    fn test_unmatched_responses_is_error() {
        // Values present but matching no schema question
        let record = record_with(json!({ "unrelated": 1, "junk": "x" }));
        let err = ResponseBuilder::new().build(&record, &schema()).unwrap_err();
        assert!(matches!(err, SyncError::EmptyResponses { .. }));
    }
}
