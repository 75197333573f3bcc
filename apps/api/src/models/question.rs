use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::interview::QuestionSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub category_id: Uuid,
    pub level: String,
    /// "intro" | "core" | "closing"
    pub question_type: String,
    pub content: String,
    pub follow_up: bool,
    pub audio_url: Option<String>,
}

impl QuestionRow {
    pub fn snapshot(&self) -> QuestionSnapshot {
        QuestionSnapshot {
            id: self.id.to_string(),
            content: self.content.clone(),
            question_type: self.question_type.clone(),
            level: self.level.clone(),
            follow_up: self.follow_up,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TierRow {
    pub id: Uuid,
    pub title: String,
    /// Total questions per session, intro and closing included.
    pub quota: i32,
}
