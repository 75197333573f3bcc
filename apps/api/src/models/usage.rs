use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::usage::aggregate::UsageTotals;
use crate::usage::record::UsageRecord;

/// Aggregated usage of one completed interview. At most one per interview.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub interview_id: Uuid,
    pub category: String,
    pub level: String,
    pub tier: String,
    pub total_tokens: i64,
    pub total_text_cost: Decimal,
    pub total_speech_characters: i64,
    pub total_speech_cost: Decimal,
    pub total_transcription_seconds: i64,
    pub total_transcription_cost: Decimal,
    pub total_cost: Decimal,
    pub details: Json<Vec<UsageRecord>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A usage log ready to be written alongside an evaluation.
#[derive(Debug, Clone)]
pub struct NewUsageLog {
    pub user_id: Uuid,
    pub interview_id: Uuid,
    pub category: String,
    pub level: String,
    pub tier: String,
    pub totals: UsageTotals,
    pub details: Vec<UsageRecord>,
}

/// Lifetime usage statistics for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub total_tokens_all_time: i64,
    pub total_interviews: i64,
    pub avg_tokens_per_interview: f64,
}
