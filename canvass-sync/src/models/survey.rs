//! Survey schema and canonical answer entries
//!
//! The schema cache is populated when a survey is downloaded for capture; the
//! response builder uses it to reconstruct a canonical answer list when the
//! capture layer did not persist one.

use serde::{Deserialize, Serialize};

/// Cached survey schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySchema {
    pub survey_id: String,
    pub title: Option<String>,
    pub sections: Vec<SurveySection>,
}

impl SurveySchema {
    /// All questions across sections, in schema order
    pub fn questions(&self) -> impl Iterator<Item = &SurveyQuestion> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySection {
    pub id: String,
    pub title: Option<String>,
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub required: bool,
    /// Choice options, for option-bearing question types
    #[serde(default)]
    pub options: Vec<String>,
}

/// One canonical question/answer entry submitted to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: String,
    /// Question text snapshot, kept for audit
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    /// Raw captured value; null when skipped
    pub value: serde_json::Value,
    /// Options snapshot, kept for audit
    #[serde(default)]
    pub options: Vec<String>,
    /// Required question with no captured value
    #[serde(default)]
    pub is_skipped: bool,
}
