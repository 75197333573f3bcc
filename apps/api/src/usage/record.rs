use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::llm_client::TokenUsage;
use crate::usage::cost::CostRates;

/// Model label recorded for transcription calls.
pub const TRANSCRIPTION_MODEL: &str = "whisper-v3";

/// Metered cost inputs of a single AI, speech or transcription call.
///
/// Lives in the session buffer until drained, then is snapshotted into a
/// `UsageLog`'s details list. The `*_cost` fields are recomputed from the unit
/// counts when the log is built; values set here are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub function_name: String,
    pub model: String,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub text_cost: Decimal,
    #[serde(default)]
    pub speech_characters: u64,
    #[serde(default)]
    pub speech_cost: Decimal,
    #[serde(default)]
    pub transcription_seconds: u64,
    #[serde(default)]
    pub transcription_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    fn empty(function_name: &str, model: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            model: model.to_string(),
            prompt_tokens: 0,
            output_tokens: 0,
            reasoning_tokens: 0,
            total_tokens: 0,
            text_cost: Decimal::ZERO,
            speech_characters: 0,
            speech_cost: Decimal::ZERO,
            transcription_seconds: 0,
            transcription_cost: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Record for a text-generation call that reported usage metadata.
    pub fn text_generation(
        function_name: &str,
        model: &str,
        usage: &TokenUsage,
        rates: &CostRates,
    ) -> Self {
        let mut record = Self::empty(function_name, model);
        record.prompt_tokens = u64::from(usage.input_tokens);
        record.output_tokens = u64::from(usage.output_tokens);
        record.reasoning_tokens = u64::from(usage.reasoning_tokens.unwrap_or(0));
        record.total_tokens = usage.total();
        record.text_cost = rates.text_generation_cost(record.prompt_tokens, record.billable_output());
        record
    }

    /// Record for a transcription call. Duration is derived, never reported.
    pub fn transcription(function_name: &str, duration_seconds: u64, rates: &CostRates) -> Self {
        let mut record = Self::empty(function_name, TRANSCRIPTION_MODEL);
        record.transcription_seconds = duration_seconds;
        record.transcription_cost = rates.transcription_cost(duration_seconds);
        record
    }

    /// Attaches speech-synthesis characters (real or simulated) to this record.
    pub fn with_speech(mut self, characters: u64, rates: &CostRates) -> Self {
        self.speech_characters = characters;
        self.speech_cost = rates.speech_synthesis_cost(characters);
        self
    }

    /// Output units billed at the output rate: generated plus reasoning tokens.
    pub fn billable_output(&self) -> u64 {
        self.output_tokens + self.reasoning_tokens
    }
}
