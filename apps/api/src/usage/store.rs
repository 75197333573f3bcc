use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::usage::{UsageLogRow, UsageStats};

/// Read side of the persisted usage logs. Logs are written only by the
/// evaluation commit (see `InterviewStore::complete_evaluation`).
#[async_trait]
pub trait UsageLogStore: Send + Sync {
    /// One page of a user's logs, newest first, plus the user's total log count.
    /// `page` is 1-based.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<UsageLogRow>, i64)>;

    async fn stats_for_user(&self, user_id: Uuid) -> Result<UsageStats>;
}

#[derive(Clone)]
pub struct PgUsageLogStore {
    pool: PgPool,
}

impl PgUsageLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogStore for PgUsageLogStore {
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<UsageLogRow>, i64)> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let logs = sqlx::query_as::<_, UsageLogRow>(
            r#"
            SELECT * FROM usage_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM usage_logs WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((logs, total))
    }

    async fn stats_for_user(&self, user_id: Uuid) -> Result<UsageStats> {
        let (total_tokens_all_time, total_interviews, avg_tokens_per_interview): (i64, i64, f64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(total_tokens), 0)::BIGINT,
                    COUNT(*),
                    COALESCE(AVG(total_tokens), 0)::FLOAT8
                FROM usage_logs
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(UsageStats {
            total_tokens_all_time,
            total_interviews,
            avg_tokens_per_interview,
        })
    }
}
