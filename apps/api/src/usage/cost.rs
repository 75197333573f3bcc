//! Cost model: pure conversions from raw usage units to a USD estimate.
//!
//! Every function here is deterministic and side-effect free. Money is carried
//! as `Decimal` so aggregation over a details list is exact and order-independent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Assumed voice-recording bitrate: 64 kbps ≈ 8 KiB per second.
pub const AUDIO_BYTES_PER_SECOND: u64 = 8192;
/// Floor applied to every audio duration estimate, in seconds.
pub const MIN_AUDIO_DURATION_SECS: u64 = 3;

const UNITS_PER_MILLION: i64 = 1_000_000;

/// Fixed per-unit rates, all in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub text_input_per_million: Decimal,
    pub text_output_per_million: Decimal,
    pub speech_per_character: Decimal,
    pub transcription_per_second: Decimal,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            // $0.10 / 1M input units
            text_input_per_million: Decimal::new(10, 2),
            // $0.40 / 1M output units
            text_output_per_million: Decimal::new(40, 2),
            // $22 per 100k characters
            speech_per_character: Decimal::new(22, 5),
            // $0.0015 per minute
            transcription_per_second: Decimal::new(25, 6),
        }
    }
}

impl CostRates {
    /// `input * input_rate + output * output_rate`, both rates per million units.
    pub fn text_generation_cost(&self, input_units: u64, output_units: u64) -> Decimal {
        let million = Decimal::from(UNITS_PER_MILLION);
        Decimal::from(input_units) * self.text_input_per_million / million
            + Decimal::from(output_units) * self.text_output_per_million / million
    }

    pub fn speech_synthesis_cost(&self, character_count: u64) -> Decimal {
        Decimal::from(character_count) * self.speech_per_character
    }

    pub fn transcription_cost(&self, duration_seconds: u64) -> Decimal {
        Decimal::from(duration_seconds) * self.transcription_per_second
    }
}

/// Estimates spoken duration from an audio payload's size.
///
/// Divides by [`AUDIO_BYTES_PER_SECOND`], rounds half away from zero, and
/// never returns less than [`MIN_AUDIO_DURATION_SECS`] (short clips are
/// mostly container header).
pub fn estimate_audio_duration(byte_length: u64) -> u64 {
    let rounded = (byte_length + AUDIO_BYTES_PER_SECOND / 2) / AUDIO_BYTES_PER_SECOND;
    rounded.max(MIN_AUDIO_DURATION_SECS)
}
