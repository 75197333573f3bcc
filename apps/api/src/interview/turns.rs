//! Turn-level calls made while an interview is running.
//!
//! Each call meters itself into the user's usage buffer. Metering is
//! best-effort: missing usage metadata or a buffer failure never fails the turn.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::prompts::turn_prompt;
use crate::llm_client::prompts::PLAIN_TEXT_SYSTEM;
use crate::llm_client::TextGenerator;
use crate::speech::{AudioClip, SpeechService, SynthesisOutcome, Transcriber};
use crate::usage::buffer::{record_best_effort, UsageBuffer};
use crate::usage::cost::{estimate_audio_duration, CostRates};
use crate::usage::record::UsageRecord;

pub const RESPOND_FUNCTION: &str = "respond_to_answer";
pub const TRANSCRIBE_FUNCTION: &str = "transcribe_answer";

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub text: String,
    pub is_follow_up: bool,
    pub speech: SynthesisOutcome,
    /// False when the provider sent no usage metadata and nothing was buffered.
    pub usage_recorded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscribedAnswer {
    pub transcription: String,
    pub duration_seconds: u64,
    pub cost: Decimal,
}

#[derive(Clone)]
pub struct TurnService {
    llm: Arc<dyn TextGenerator>,
    transcriber: Arc<dyn Transcriber>,
    speech: SpeechService,
    buffer: Arc<dyn UsageBuffer>,
    rates: CostRates,
}

impl TurnService {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        transcriber: Arc<dyn Transcriber>,
        speech: SpeechService,
        buffer: Arc<dyn UsageBuffer>,
        rates: CostRates,
    ) -> Self {
        Self {
            llm,
            transcriber,
            speech,
            buffer,
            rates,
        }
    }

    /// Produces the interviewer's acknowledgment, or a follow-up question when
    /// `need_follow_up` is set, and voices it.
    pub async fn respond_to_answer(
        &self,
        user_id: Uuid,
        question: &str,
        answer: &str,
        need_follow_up: bool,
    ) -> Result<TurnReply, AppError> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(AppError::Validation(
                "question and answer must not be empty".to_string(),
            ));
        }

        let generation = self
            .llm
            .generate(&turn_prompt(question, answer, need_follow_up), PLAIN_TEXT_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Turn response failed: {e}")))?;
        let text = generation.text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::Llm("Turn response was empty".to_string()));
        }

        let text_record = generation.usage.as_ref().map(|usage| {
            UsageRecord::text_generation(RESPOND_FUNCTION, &generation.model, usage, &self.rates)
        });

        let speech = match self.speech.synthesize(&text).await {
            Ok(speech) => speech,
            Err(e) => {
                // The generation is billed even though the turn fails.
                if let Some(record) = text_record {
                    warn!("Speech synthesis failed for user {user_id}, metering text generation only");
                    record_best_effort(self.buffer.as_ref(), user_id, record).await;
                }
                return Err(AppError::Speech(e.to_string()));
            }
        };

        let usage_recorded = match text_record {
            Some(record) => {
                let record = record.with_speech(speech.characters, &self.rates);
                debug!(
                    "{RESPOND_FUNCTION} for user {user_id}: {} tokens, {} speech chars",
                    record.total_tokens, record.speech_characters
                );
                record_best_effort(self.buffer.as_ref(), user_id, record).await;
                true
            }
            None => {
                info!("{RESPOND_FUNCTION} for user {user_id} returned no usage metadata, not metered");
                false
            }
        };

        Ok(TurnReply {
            text,
            is_follow_up: need_follow_up,
            speech,
            usage_recorded,
        })
    }

    /// Transcribes a recorded answer. The billable duration is estimated from
    /// the clip size, so this call is always metered.
    pub async fn transcribe_answer(
        &self,
        user_id: Uuid,
        clip: &AudioClip,
    ) -> Result<TranscribedAnswer, AppError> {
        if clip.bytes.is_empty() {
            return Err(AppError::Validation("audio file is empty".to_string()));
        }

        let transcription = self
            .transcriber
            .transcribe(clip)
            .await
            .map_err(|e| AppError::Speech(format!("Transcription failed: {e}")))?;

        let duration_seconds = estimate_audio_duration(clip.bytes.len() as u64);
        let record = UsageRecord::transcription(TRANSCRIBE_FUNCTION, duration_seconds, &self.rates);
        let cost = record.transcription_cost;
        debug!(
            "{TRANSCRIBE_FUNCTION} for user {user_id}: {} bytes, ~{duration_seconds}s, ${cost}",
            clip.bytes.len()
        );
        record_best_effort(self.buffer.as_ref(), user_id, record).await;

        Ok(TranscribedAnswer {
            transcription,
            duration_seconds,
            cost,
        })
    }
}
