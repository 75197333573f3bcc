use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::interview::QuestionSnapshot;
use crate::models::question::{QuestionRow, TierRow};
use crate::models::user::User;

/// Every session opens with one intro question and ends with one closing question.
const BOOKEND_QUESTIONS: i32 = 2;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub level: String,
    pub tier: String,
    pub token_cost: i64,
}

#[derive(Debug, Serialize)]
pub struct StartedSession {
    pub category_id: Uuid,
    pub level: String,
    pub tier: String,
    pub questions: Vec<QuestionSnapshot>,
    pub remaining_tokens: i64,
}

/// Number of core questions a tier's quota leaves once intro and closing are counted.
pub fn core_question_count(quota: i32) -> Result<i64, AppError> {
    if quota < BOOKEND_QUESTIONS {
        return Err(AppError::Validation(format!(
            "tier quota must be at least {BOOKEND_QUESTIONS}, got {quota}"
        )));
    }
    Ok(i64::from(quota - BOOKEND_QUESTIONS))
}

/// Picks the session's questions and debits the session price.
///
/// Questions are selected before the debit so a session that cannot be
/// assembled never costs tokens. The debit itself is one conditional update,
/// so concurrent starts can never take the balance below zero.
pub async fn start_session(
    pool: &PgPool,
    req: &StartSessionRequest,
) -> Result<StartedSession, AppError> {
    if req.token_cost < 0 {
        return Err(AppError::Validation("token_cost must not be negative".to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(req.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", req.user_id)))?;
    if user.token_balance < req.token_cost {
        return Err(AppError::InsufficientTokens);
    }

    let tier = sqlx::query_as::<_, TierRow>("SELECT * FROM tiers WHERE LOWER(title) = LOWER($1)")
        .bind(&req.tier)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Unknown tier '{}'", req.tier)))?;
    let core_count = core_question_count(tier.quota)?;

    let mut questions = random_questions(pool, req, "intro", 1).await?;
    questions.extend(random_questions(pool, req, "core", core_count).await?);
    questions.extend(random_questions(pool, req, "closing", 1).await?);
    if questions.is_empty() {
        return Err(AppError::NotFound(format!(
            "No questions for category {} at level '{}'",
            req.category_id, req.level
        )));
    }

    let remaining_tokens: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET token_balance = token_balance - $1
        WHERE id = $2 AND token_balance >= $1
        RETURNING token_balance
        "#,
    )
    .bind(req.token_cost)
    .bind(req.user_id)
    .fetch_optional(pool)
    .await?;
    let remaining_tokens = remaining_tokens.ok_or(AppError::InsufficientTokens)?;

    info!(
        "Started session for {} ({} questions, tier {}), {} tokens left",
        user.email,
        questions.len(),
        tier.title,
        remaining_tokens
    );

    Ok(StartedSession {
        category_id: req.category_id,
        level: req.level.clone(),
        tier: tier.title,
        questions: questions.iter().map(QuestionRow::snapshot).collect(),
        remaining_tokens,
    })
}

async fn random_questions(
    pool: &PgPool,
    req: &StartSessionRequest,
    question_type: &str,
    count: i64,
) -> Result<Vec<QuestionRow>, AppError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    Ok(sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT * FROM questions
        WHERE category_id = $1 AND level = $2 AND question_type = $3
        ORDER BY random()
        LIMIT $4
        "#,
    )
    .bind(req.category_id)
    .bind(&req.level)
    .bind(question_type)
    .bind(count)
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_question_count_excludes_bookends() {
        assert_eq!(core_question_count(2).unwrap(), 0);
        assert_eq!(core_question_count(7).unwrap(), 5);
    }

    #[test]
    fn test_quota_below_two_is_rejected() {
        assert!(matches!(
            core_question_count(1),
            Err(AppError::Validation(_))
        ));
    }
}
