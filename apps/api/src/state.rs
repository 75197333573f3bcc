use std::sync::Arc;

use sqlx::PgPool;

use crate::interview::evaluator::InterviewEvaluator;
use crate::interview::store::InterviewStore;
use crate::interview::turns::TurnService;
use crate::usage::store::UsageLogStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Used directly by session start; everything else goes through the stores.
    pub db: PgPool,
    pub interviews: Arc<dyn InterviewStore>,
    pub usage_logs: Arc<dyn UsageLogStore>,
    pub evaluator: Arc<InterviewEvaluator>,
    pub turns: TurnService,
}
