use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::interview::evaluation::Evaluation;

/// Question as it was asked, frozen into the interview record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSnapshot {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub level: String,
    #[serde(default)]
    pub follow_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: Option<String>,
    pub question: String,
    pub transcription: String,
    /// Spoken duration in seconds.
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub is_follow_up: bool,
    pub acknowledgment: Option<String>,
}

/// One interview session.
///
/// `evaluated = true` with `evaluation = NULL` means an evaluation holds the
/// lock and is still running.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub category: String,
    pub level: String,
    pub tier: String,
    pub questions: Json<Vec<QuestionSnapshot>>,
    pub answers: Json<Vec<Answer>>,
    pub completed_at: DateTime<Utc>,
    pub evaluated: bool,
    pub evaluation: Option<Json<Evaluation>>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl InterviewRow {
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref().map(|e| &e.0)
    }
}

/// Fields supplied when a finished session is saved.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInterview {
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub category: String,
    pub level: String,
    pub tier: String,
    pub questions: Vec<QuestionSnapshot>,
    pub answers: Vec<Answer>,
}
