//! Folds a list of usage records into authoritative per-interview totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::usage::cost::CostRates;
use crate::usage::record::UsageRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_tokens: u64,
    pub text_cost: Decimal,
    pub speech_characters: u64,
    pub speech_cost: Decimal,
    pub transcription_seconds: u64,
    pub transcription_cost: Decimal,
    pub total_cost: Decimal,
}

/// Recomputes each record's monetary cost from its unit counts.
///
/// Pre-computed cost fields are overwritten so a stored details list always
/// agrees with the rates that produced its totals.
pub fn reprice(details: &mut [UsageRecord], rates: &CostRates) {
    for record in details.iter_mut() {
        record.text_cost = rates.text_generation_cost(record.prompt_tokens, record.billable_output());
        record.speech_cost = rates.speech_synthesis_cost(record.speech_characters);
        record.transcription_cost = rates.transcription_cost(record.transcription_seconds);
    }
}

/// Cost of one record, computed from its unit counts alone.
pub fn record_cost(record: &UsageRecord, rates: &CostRates) -> Decimal {
    rates.text_generation_cost(record.prompt_tokens, record.billable_output())
        + rates.speech_synthesis_cost(record.speech_characters)
        + rates.transcription_cost(record.transcription_seconds)
}

/// Sums every record's units and independently priced costs.
pub fn aggregate(details: &[UsageRecord], rates: &CostRates) -> UsageTotals {
    let mut totals = details
        .iter()
        .fold(UsageTotals::default(), |mut acc, record| {
            acc.total_tokens += record.total_tokens;
            acc.text_cost += rates.text_generation_cost(record.prompt_tokens, record.billable_output());
            acc.speech_characters += record.speech_characters;
            acc.speech_cost += rates.speech_synthesis_cost(record.speech_characters);
            acc.transcription_seconds += record.transcription_seconds;
            acc.transcription_cost += rates.transcription_cost(record.transcription_seconds);
            acc
        });
    totals.total_cost = details.iter().map(|record| record_cost(record, rates)).sum();
    totals
}
