//! Speech capabilities: transcription of answers and synthesis of replies.
//!
//! Like `llm_client`, these are the only modules that talk to the speech
//! providers. Interview code holds them as trait objects.

pub mod synthesis;
pub mod transcription;

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::usage::cost::CostRates;

pub use synthesis::{ElevenLabsClient, SpeechSynthesizer};
pub use transcription::{AudioClip, Transcriber, WhisperClient};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Speech synthesis is not configured")]
    NotConfigured,
}

/// Whether replies are really synthesized or only costed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechMode {
    /// Count characters and compute cost; skip the provider call.
    Simulate,
    Live,
}

impl FromStr for SpeechMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulate" => Ok(Self::Simulate),
            "live" => Ok(Self::Live),
            other => anyhow::bail!("SPEECH_MODE must be 'simulate' or 'live', got '{other}'"),
        }
    }
}

/// Result of voicing one reply.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    #[serde(skip)]
    pub audio: Bytes,
    pub characters: u64,
    pub cost: Decimal,
    /// False when the provider was not called (simulation mode).
    pub performed: bool,
}

/// Applies the configured `SpeechMode` in front of the synthesis capability.
#[derive(Clone)]
pub struct SpeechService {
    mode: SpeechMode,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    rates: CostRates,
}

impl SpeechService {
    pub fn new(
        mode: SpeechMode,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        rates: CostRates,
    ) -> Self {
        Self {
            mode,
            synthesizer,
            rates,
        }
    }

    #[cfg(test)]
    pub fn simulated(rates: CostRates) -> Self {
        Self::new(SpeechMode::Simulate, None, rates)
    }

    pub async fn synthesize(&self, text: &str) -> Result<SynthesisOutcome, SpeechError> {
        let characters = text.chars().count() as u64;
        let cost = self.rates.speech_synthesis_cost(characters);

        match self.mode {
            SpeechMode::Simulate => {
                info!("Speech simulation: {characters} characters, cost ${cost} (audio not generated)");
                Ok(SynthesisOutcome {
                    audio: Bytes::new(),
                    characters,
                    cost,
                    performed: false,
                })
            }
            SpeechMode::Live => {
                let synthesizer = self.synthesizer.as_ref().ok_or(SpeechError::NotConfigured)?;
                let audio = synthesizer.synthesize(text).await?;
                info!(
                    "Synthesized {characters} characters into {} bytes, cost ${cost}",
                    audio.len()
                );
                Ok(SynthesisOutcome {
                    audio,
                    characters,
                    cost,
                    performed: true,
                })
            }
        }
    }
}
