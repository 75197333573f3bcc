//! Axum route handlers for the Interview API.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::Engine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::evaluation::Evaluation;
use crate::interview::session::{start_session, StartSessionRequest, StartedSession};
use crate::interview::turns::TranscribedAnswer;
use crate::models::interview::{Answer, InterviewRow, NewInterview};
use crate::speech::AudioClip;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub user_id: Uuid,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub need_follow_up: bool,
}

#[derive(Debug, Serialize)]
pub struct SpeechCost {
    pub characters: u64,
    pub cost: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub text: String,
    pub audio_base64: String,
    pub content_type: &'static str,
    pub is_follow_up: bool,
    /// True when speech runs in simulation mode and no audio was produced.
    pub audio_disabled: bool,
    pub speech: SpeechCost,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub answer: TranscribedAnswer,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptEvaluationRequest {
    pub user_id: Uuid,
    pub category: String,
    pub level: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub success: bool,
    pub evaluation: Evaluation,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct SaveInterviewResponse {
    pub interview_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub interviews: Vec<InterviewRow>,
}

// ────────────────────────────────────────────────────────────────────────────
// Session (turn-level) handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions/start
pub async fn handle_start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartedSession>), AppError> {
    let session = start_session(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/v1/sessions/answer
/// Multipart: `user_id` text field + `file` audio field.
pub async fn handle_transcribe_answer(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut clip: Option<AudioClip> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid user_id field: {e}")))?;
                user_id = Some(
                    Uuid::parse_str(text.trim())
                        .map_err(|_| AppError::Validation("user_id must be a UUID".to_string()))?,
                );
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("answer.webm").to_string();
                let mime_type = field.content_type().unwrap_or("audio/webm").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid file field: {e}")))?;
                clip = Some(AudioClip {
                    bytes,
                    mime_type,
                    file_name,
                });
            }
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    let clip = clip.ok_or_else(|| AppError::Validation("audio file is required".to_string()))?;

    let answer = state.turns.transcribe_answer(user_id, &clip).await?;
    Ok(Json(TranscriptionResponse { user_id, answer }))
}

/// POST /api/v1/sessions/response
pub async fn handle_turn_response(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), AppError> {
    let reply = state
        .turns
        .respond_to_answer(req.user_id, &req.question, &req.answer, req.need_follow_up)
        .await?;

    let audio_base64 = if reply.speech.performed {
        base64::engine::general_purpose::STANDARD.encode(&reply.speech.audio)
    } else {
        String::new()
    };

    Ok((
        StatusCode::CREATED,
        Json(TurnResponse {
            text: reply.text,
            audio_base64,
            content_type: "audio/mpeg",
            is_follow_up: reply.is_follow_up,
            audio_disabled: !reply.speech.performed,
            speech: SpeechCost {
                characters: reply.speech.characters,
                cost: reply.speech.cost,
            },
        }),
    ))
}

/// POST /api/v1/sessions/evaluate
/// Evaluates an unsaved transcript; nothing is persisted.
pub async fn handle_evaluate_transcript(
    State(state): State<AppState>,
    Json(req): Json<TranscriptEvaluationRequest>,
) -> Result<Json<EvaluationResponse>, AppError> {
    if req.answers.is_empty() {
        return Err(AppError::Validation("answers must not be empty".to_string()));
    }

    let evaluation = state
        .evaluator
        .evaluate_transcript(req.user_id, &req.category, &req.level, &req.answers)
        .await?;

    Ok(Json(EvaluationResponse {
        success: true,
        evaluation,
        cached: false,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Saved interview handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interviews
pub async fn handle_save_interview(
    State(state): State<AppState>,
    Json(req): Json<NewInterview>,
) -> Result<(StatusCode, Json<SaveInterviewResponse>), AppError> {
    if req.answers.is_empty() {
        return Err(AppError::Validation("answers must not be empty".to_string()));
    }
    if req.category.trim().is_empty() || req.level.trim().is_empty() {
        return Err(AppError::Validation("category and level are required".to_string()));
    }

    let row = state.interviews.create(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SaveInterviewResponse { interview_id: row.id }),
    ))
}

/// GET /api/v1/interviews?user_id=
pub async fn handle_interview_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let interviews = state.interviews.list_for_user(query.user_id).await?;
    Ok(Json(HistoryResponse { interviews }))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewRow>, AppError> {
    let interview = state
        .interviews
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))?;
    Ok(Json(interview))
}

/// POST /api/v1/interviews/:id/evaluate
/// 200 with the evaluation, 404 for an unknown interview, 409 while another
/// request is still evaluating it.
pub async fn handle_evaluate_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EvaluationResponse>, AppError> {
    let result = state.evaluator.evaluate(id).await?;
    Ok(Json(EvaluationResponse {
        success: true,
        evaluation: result.evaluation,
        cached: result.cached,
    }))
}
