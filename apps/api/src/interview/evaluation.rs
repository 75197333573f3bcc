//! Evaluation result schema and the parser that turns model output into it.
//!
//! Model output is untrusted: fences are stripped, the JSON must match the
//! schema, and every score must lie in 0–100. The overall grade is always
//! derived from the overall score with [`Grade::for_score`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::llm_client::strip_json_fences;
use crate::models::interview::Answer;

/// Number of per-dimension sub-scores every evaluation carries.
pub const DIMENSION_COUNT: usize = 5;

/// The dimensions, in the order the prompt asks for them.
pub const DIMENSIONS: [&str; DIMENSION_COUNT] = [
    "Content Quality",
    "Communication Skills",
    "Relevance & Focus",
    "Problem Solving Approach",
    "Confidence & Enthusiasm",
];

/// Fixed letter scale, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

impl Grade {
    /// Maps an overall score onto the scale:
    /// 95+ A+, 90 A, 85 A-, 80 B+, 75 B, 70 B-, 65 C+, 60 C, 55 C-, 50 D, below 50 F.
    pub fn for_score(score: u8) -> Grade {
        match score {
            95..=u8::MAX => Grade::APlus,
            90..=94 => Grade::A,
            85..=89 => Grade::AMinus,
            80..=84 => Grade::BPlus,
            75..=79 => Grade::B,
            70..=74 => Grade::BMinus,
            65..=69 => Grade::CPlus,
            60..=64 => Grade::C,
            55..=59 => Grade::CMinus,
            50..=54 => Grade::D,
            _ => Grade::F,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub category: String,
    pub score: u8,
    pub max_score: u8,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// Stored evaluation of one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub overall_score: u8,
    pub overall_grade: Grade,
    pub evaluations: Vec<DimensionScore>,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub total_questions: usize,
    /// Whole minutes, floor of the summed answer durations, e.g. "1 minutes".
    pub completion_time: String,
}

#[derive(Debug, Error)]
pub enum EvaluationParseError {
    #[error("evaluation is not valid JSON for the schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid evaluation: {0}")]
    Invalid(String),
}

// Shape the model is asked to produce. Scores arrive as JSON numbers that
// may carry a fraction.
#[derive(Debug, Deserialize)]
struct RawEvaluation {
    overall_score: f64,
    overall_grade: Option<String>,
    evaluations: Vec<RawDimension>,
    summary: String,
    recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDimension {
    category: String,
    score: f64,
    #[serde(default = "default_max_score")]
    max_score: f64,
    feedback: String,
    strengths: Vec<String>,
    improvements: Vec<String>,
}

fn default_max_score() -> f64 {
    100.0
}

fn to_score(value: f64, field: &str) -> Result<u8, EvaluationParseError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(EvaluationParseError::Invalid(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(value.round() as u8)
}

/// Total spoken seconds across answers, rendered as whole minutes.
pub fn completion_time(answers: &[Answer]) -> String {
    let seconds: u64 = answers.iter().map(|a| u64::from(a.duration)).sum();
    format!("{} minutes", seconds / 60)
}

/// Parses model output into an `Evaluation`, filling the derived fields from `answers`.
pub fn parse_evaluation(raw: &str, answers: &[Answer]) -> Result<Evaluation, EvaluationParseError> {
    let cleaned = strip_json_fences(raw);
    let parsed: RawEvaluation = serde_json::from_str(&cleaned)?;

    if parsed.evaluations.len() != DIMENSION_COUNT {
        return Err(EvaluationParseError::Invalid(format!(
            "expected {DIMENSION_COUNT} dimension scores, got {}",
            parsed.evaluations.len()
        )));
    }
    if parsed.summary.trim().is_empty() {
        return Err(EvaluationParseError::Invalid("summary is empty".to_string()));
    }

    let overall_score = to_score(parsed.overall_score, "overall_score")?;
    let overall_grade = Grade::for_score(overall_score);
    if let Some(claimed) = parsed.overall_grade.as_deref() {
        let matches = serde_json::from_value::<Grade>(serde_json::Value::String(claimed.to_string()))
            .map(|g| g == overall_grade)
            .unwrap_or(false);
        if !matches {
            warn!("Model graded {overall_score} as '{claimed}', storing {overall_grade:?} instead");
        }
    }

    for (expected, got) in DIMENSIONS.iter().zip(&parsed.evaluations) {
        if !got.category.eq_ignore_ascii_case(expected) {
            warn!("Dimension '{}' reported where '{expected}' was expected", got.category);
        }
    }

    let evaluations = parsed
        .evaluations
        .into_iter()
        .map(|d| {
            let score = to_score(d.score, &format!("score of '{}'", d.category))?;
            let max_score = to_score(d.max_score, &format!("max_score of '{}'", d.category))?;
            Ok(DimensionScore {
                category: d.category,
                score,
                max_score,
                feedback: d.feedback,
                strengths: d.strengths,
                improvements: d.improvements,
            })
        })
        .collect::<Result<Vec<_>, EvaluationParseError>>()?;

    Ok(Evaluation {
        overall_score,
        overall_grade,
        evaluations,
        summary: parsed.summary,
        recommendations: parsed.recommendations,
        total_questions: answers.len(),
        completion_time: completion_time(answers),
    })
}
