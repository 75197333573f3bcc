pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;
use crate::usage::handlers as usage_handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Running session: turn-level calls, metered into the usage buffer
        .route("/api/v1/sessions/start", post(handlers::handle_start_session))
        .route(
            "/api/v1/sessions/answer",
            post(handlers::handle_transcribe_answer),
        )
        .route(
            "/api/v1/sessions/response",
            post(handlers::handle_turn_response),
        )
        .route(
            "/api/v1/sessions/evaluate",
            post(handlers::handle_evaluate_transcript),
        )
        // Saved interviews
        .route(
            "/api/v1/interviews",
            get(handlers::handle_interview_history).post(handlers::handle_save_interview),
        )
        .route("/api/v1/interviews/:id", get(handlers::handle_get_interview))
        .route(
            "/api/v1/interviews/:id/evaluate",
            post(handlers::handle_evaluate_interview),
        )
        // Usage reporting
        .route("/api/v1/usage", get(usage_handlers::handle_usage_history))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::{Config, UsageBufferBackend};
    use crate::interview::evaluation::parse_evaluation;
    use crate::interview::evaluation::tests::{answer, model_reply};
    use crate::interview::evaluator::InterviewEvaluator;
    use crate::interview::turns::TurnService;
    use crate::speech::{SpeechMode, SpeechService};
    use crate::test_support::{usage, FixedTranscriber, MemoryInterviewStore, ScriptedGenerator};
    use crate::usage::buffer::InMemoryUsageBuffer;
    use crate::usage::cost::CostRates;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/interview_test".to_string(),
            anthropic_api_key: "test".to_string(),
            whisper_api_key: "test".to_string(),
            whisper_api_url: "http://localhost/transcribe".to_string(),
            elevenlabs_api_key: None,
            speech_mode: SpeechMode::Simulate,
            usage_buffer: UsageBufferBackend::Memory,
            redis_url: None,
            usage_buffer_ttl: Duration::from_secs(60),
            evaluation_wait: Duration::ZERO,
            evaluation_lock_ttl: Duration::from_secs(600),
            cost_rates: CostRates::default(),
            port: 0,
            rust_log: "debug".to_string(),
        }
    }

    fn app(store: Arc<MemoryInterviewStore>) -> Router {
        let config = test_config();
        let rates = config.cost_rates;
        let buffer = Arc::new(InMemoryUsageBuffer::new());
        let llm = Arc::new(ScriptedGenerator::replying(
            model_reply(86),
            Some(usage(1200, 400)),
        ));
        let state = AppState {
            // Never connected: these routes only touch the in-memory stores.
            db: PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap(),
            interviews: store.clone(),
            usage_logs: store.clone(),
            evaluator: Arc::new(InterviewEvaluator::new(
                store,
                buffer.clone(),
                llm.clone(),
                rates,
                config.evaluation_wait,
            )),
            turns: TurnService::new(
                llm,
                Arc::new(FixedTranscriber("transcript".to_string())),
                SpeechService::simulated(rates),
                buffer,
                rates,
            ),
        };
        build_router(state)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(MemoryInterviewStore::new()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_unknown_interview_is_404() {
        let response = app(Arc::new(MemoryInterviewStore::new()))
            .oneshot(
                Request::post(format!("/api/v1/interviews/{}/evaluate", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_evaluate_returns_evaluation() {
        let store = Arc::new(MemoryInterviewStore::new());
        let id = store
            .seed_interview(Uuid::new_v4(), vec![answer("Q", "A", 60), answer("Q", "A", 45)])
            .id;

        let response = app(store.clone())
            .oneshot(
                Request::post(format!("/api/v1/interviews/{id}/evaluate"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["cached"], false);
        assert_eq!(body["evaluation"]["overall_grade"], "A-");
        assert_eq!(body["evaluation"]["total_questions"], 2);
        assert_eq!(body["evaluation"]["completion_time"], "1 minutes");
    }

    #[tokio::test]
    async fn test_evaluate_in_progress_is_409() {
        let store = Arc::new(MemoryInterviewStore::new());
        let id = store.seed_interview(Uuid::new_v4(), vec![]).id;
        // Another request holds the lock and never finishes within the wait.
        let _ = crate::interview::store::InterviewStore::try_mark_evaluating(store.as_ref(), id)
            .await
            .unwrap();

        let response = app(store)
            .oneshot(
                Request::post(format!("/api/v1/interviews/{id}/evaluate"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_get_interview_shows_stored_evaluation() {
        let store = Arc::new(MemoryInterviewStore::new());
        let id = store.seed_interview(Uuid::new_v4(), vec![]).id;
        store.set_evaluation(id, parse_evaluation(&model_reply(52), &[]).unwrap());

        let response = app(store)
            .oneshot(
                Request::get(format!("/api/v1/interviews/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["evaluated"], true);
        assert_eq!(body["evaluation"]["overall_grade"], "D");
    }

    #[tokio::test]
    async fn test_turn_response_in_simulation_mode_has_no_audio() {
        let body = serde_json::json!({
            "user_id": Uuid::new_v4(),
            "question": "Why this team?",
            "answer": "I like the product",
        });
        let response = app(Arc::new(MemoryInterviewStore::new()))
            .oneshot(
                Request::post("/api/v1/sessions/response")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["audio_base64"], "");
        assert_eq!(body["audio_disabled"], true);
        assert!(body["speech"]["characters"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_usage_history_pages_and_stats() {
        let store = Arc::new(MemoryInterviewStore::new());
        let user = Uuid::new_v4();
        for tokens in [100, 200, 300] {
            store.push_usage_log(user, tokens);
        }
        store.push_usage_log(Uuid::new_v4(), 9999);

        let response = app(store)
            .oneshot(
                Request::get(format!("/api/v1/usage?user_id={user}&page=2&limit=2"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["logs"].as_array().unwrap().len(), 1);
        assert_eq!(body["pagination"]["current_page"], 2);
        assert_eq!(body["pagination"]["total_pages"], 2);
        assert_eq!(body["pagination"]["total_items"], 3);
        assert_eq!(body["stats"]["total_tokens_all_time"], 600);
        assert_eq!(body["stats"]["total_interviews"], 3);
        assert_eq!(body["stats"]["avg_tokens_per_interview"], 200.0);
    }
}
