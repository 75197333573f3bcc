use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::usage::{UsageLogRow, UsageStats};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct UsageHistoryQuery {
    pub user_id: Uuid,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: i64,
}

impl Pagination {
    fn new(current_page: u32, limit: u32, total_items: i64) -> Self {
        let total_items_u = u64::try_from(total_items).unwrap_or(0);
        let total_pages = total_items_u.div_ceil(u64::from(limit));
        Self {
            current_page,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total_items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageHistoryResponse {
    pub logs: Vec<UsageLogRow>,
    pub pagination: Pagination,
    pub stats: UsageStats,
}

/// GET /api/v1/usage?user_id=&page=&limit=
pub async fn handle_usage_history(
    State(state): State<AppState>,
    Query(query): Query<UsageHistoryQuery>,
) -> Result<Json<UsageHistoryResponse>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let (logs, total_items) = state
        .usage_logs
        .list_for_user(query.user_id, page, limit)
        .await?;
    let stats = state.usage_logs.stats_for_user(query.user_id).await?;

    Ok(Json(UsageHistoryResponse {
        logs,
        pagination: Pagination::new(page, limit, total_items),
        stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).total_pages, 2);
    }
}
