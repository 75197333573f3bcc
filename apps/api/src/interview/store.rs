//! Interview persistence.
//!
//! Every state change the evaluation protocol makes is a single conditional
//! statement (or one transaction), so correctness holds across any number of
//! service processes sharing the database.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::interview::evaluation::Evaluation;
use crate::models::interview::{InterviewRow, NewInterview};
use crate::models::usage::{NewUsageLog, UsageLogRow};

#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn create(&self, interview: NewInterview) -> Result<InterviewRow>;

    async fn get(&self, id: Uuid) -> Result<Option<InterviewRow>>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InterviewRow>>;

    /// Sets `evaluated = true, evaluated_at = now` where `evaluated` is false,
    /// or where a mark without an evaluation is older than the stale-lock
    /// timeout. Returns the row when this caller made the change, `None` when
    /// the row is missing or held.
    async fn try_mark_evaluating(&self, id: Uuid) -> Result<Option<InterviewRow>>;

    /// Stores the evaluation and its usage log together. Fails without
    /// writing anything unless the row still carries the mark set at
    /// `marked_at` and has no evaluation. An existing log for the interview
    /// is merged with `usage`.
    async fn complete_evaluation(
        &self,
        id: Uuid,
        marked_at: Option<DateTime<Utc>>,
        evaluation: &Evaluation,
        usage: &NewUsageLog,
    ) -> Result<UsageLogRow>;

    /// Clears the mark set at `marked_at` (`evaluated = false, evaluated_at =
    /// NULL`) unless an evaluation has been stored. Returns whether a row changed.
    async fn reset_evaluation(&self, id: Uuid, marked_at: Option<DateTime<Utc>>) -> Result<bool>;
}

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgInterviewStore {
    pool: PgPool,
    stale_lock_after: Duration,
}

impl PgInterviewStore {
    /// A mark left without an evaluation for `stale_lock_after` (a crashed
    /// holder) can be taken over by the next request.
    pub fn new(pool: PgPool, stale_lock_after: Duration) -> Self {
        Self {
            pool,
            stale_lock_after,
        }
    }
}

#[async_trait]
impl InterviewStore for PgInterviewStore {
    async fn create(&self, interview: NewInterview) -> Result<InterviewRow> {
        let row = sqlx::query_as::<_, InterviewRow>(
            r#"
            INSERT INTO interviews
                (id, user_id, category_id, category, level, tier, questions, answers)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(interview.user_id)
        .bind(interview.category_id)
        .bind(&interview.category)
        .bind(&interview.level)
        .bind(&interview.tier)
        .bind(Json(&interview.questions))
        .bind(Json(&interview.answers))
        .fetch_one(&self.pool)
        .await?;

        info!("Saved interview {} for user {}", row.id, row.user_id);
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<InterviewRow>> {
        Ok(
            sqlx::query_as::<_, InterviewRow>("SELECT * FROM interviews WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InterviewRow>> {
        Ok(sqlx::query_as::<_, InterviewRow>(
            "SELECT * FROM interviews WHERE user_id = $1 ORDER BY completed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn try_mark_evaluating(&self, id: Uuid) -> Result<Option<InterviewRow>> {
        let row = sqlx::query_as::<_, InterviewRow>(
            r#"
            UPDATE interviews
            SET evaluated = TRUE, evaluated_at = NOW()
            WHERE id = $1
              AND (evaluated = FALSE
                   OR (evaluation IS NULL
                       AND evaluated_at < NOW() - make_interval(secs => $2)))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(self.stale_lock_after.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = &row {
            debug!("Interview {} marked as evaluating at {:?}", row.id, row.evaluated_at);
        }
        Ok(row)
    }

    async fn complete_evaluation(
        &self,
        id: Uuid,
        marked_at: Option<DateTime<Utc>>,
        evaluation: &Evaluation,
        usage: &NewUsageLog,
    ) -> Result<UsageLogRow> {
        let mut tx = self.pool.begin().await?;
        let log_id = Uuid::new_v4();

        // A pre-existing row for this interview can only be a legacy partial
        // log. The new records are appended to it and its totals increased.
        let log = sqlx::query_as::<_, UsageLogRow>(
            r#"
            INSERT INTO usage_logs
                (id, user_id, interview_id, category, level, tier,
                 total_tokens, total_text_cost,
                 total_speech_characters, total_speech_cost,
                 total_transcription_seconds, total_transcription_cost,
                 total_cost, details, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
            ON CONFLICT (interview_id) DO UPDATE SET
                total_tokens = usage_logs.total_tokens + EXCLUDED.total_tokens,
                total_text_cost = usage_logs.total_text_cost + EXCLUDED.total_text_cost,
                total_speech_characters =
                    usage_logs.total_speech_characters + EXCLUDED.total_speech_characters,
                total_speech_cost = usage_logs.total_speech_cost + EXCLUDED.total_speech_cost,
                total_transcription_seconds =
                    usage_logs.total_transcription_seconds + EXCLUDED.total_transcription_seconds,
                total_transcription_cost =
                    usage_logs.total_transcription_cost + EXCLUDED.total_transcription_cost,
                total_cost = usage_logs.total_cost + EXCLUDED.total_cost,
                details = usage_logs.details || EXCLUDED.details,
                completed_at = COALESCE(usage_logs.completed_at, EXCLUDED.completed_at)
            RETURNING *
            "#,
        )
        .bind(log_id)
        .bind(usage.user_id)
        .bind(usage.interview_id)
        .bind(&usage.category)
        .bind(&usage.level)
        .bind(&usage.tier)
        .bind(to_i64(usage.totals.total_tokens))
        .bind(usage.totals.text_cost)
        .bind(to_i64(usage.totals.speech_characters))
        .bind(usage.totals.speech_cost)
        .bind(to_i64(usage.totals.transcription_seconds))
        .bind(usage.totals.transcription_cost)
        .bind(usage.totals.total_cost)
        .bind(Json(&usage.details))
        .fetch_one(&mut *tx)
        .await?;

        if log.id != log_id {
            warn!(
                "Interview {id} already had a partial usage log {}; merged {} records into it",
                log.id,
                usage.details.len()
            );
        }

        let updated = sqlx::query(
            r#"
            UPDATE interviews
            SET evaluation = $2
            WHERE id = $1
              AND evaluated = TRUE
              AND evaluation IS NULL
              AND evaluated_at IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(id)
        .bind(Json(evaluation))
        .bind(marked_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            // Dropping the transaction rolls back the usage log insert.
            bail!("interview {id} is no longer marked as evaluating by this holder");
        }

        tx.commit().await?;
        Ok(log)
    }

    async fn reset_evaluation(&self, id: Uuid, marked_at: Option<DateTime<Utc>>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE interviews
            SET evaluated = FALSE, evaluated_at = NULL
            WHERE id = $1
              AND evaluation IS NULL
              AND evaluated_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(marked_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
