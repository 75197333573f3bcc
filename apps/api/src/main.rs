mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod models;
mod routes;
mod speech;
mod state;
#[cfg(test)]
mod test_support;
mod usage;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, UsageBufferBackend};
use crate::db::create_pool;
use crate::interview::evaluator::InterviewEvaluator;
use crate::interview::store::{InterviewStore, PgInterviewStore};
use crate::interview::turns::TurnService;
use crate::llm_client::{LlmClient, TextGenerator};
use crate::routes::build_router;
use crate::speech::{ElevenLabsClient, SpeechService, SpeechSynthesizer, Transcriber, WhisperClient};
use crate::state::AppState;
use crate::usage::buffer::{InMemoryUsageBuffer, RedisUsageBuffer, UsageBuffer};
use crate::usage::store::PgUsageLogStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (aborts on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;
    let interviews: Arc<dyn InterviewStore> = Arc::new(PgInterviewStore::new(
        db.clone(),
        config.evaluation_lock_ttl,
    ));

    // Initialize the session usage buffer
    let buffer = build_usage_buffer(&config).await?;

    // Initialize capability clients
    let llm: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperClient::new(
        config.whisper_api_url.clone(),
        config.whisper_api_key.clone(),
    )?);

    let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = match &config.elevenlabs_api_key {
        Some(key) => {
            let client: Arc<dyn SpeechSynthesizer> = Arc::new(ElevenLabsClient::new(key.clone())?);
            Some(client)
        }
        None => None,
    };
    let speech = SpeechService::new(config.speech_mode, synthesizer, config.cost_rates);
    info!("Speech synthesis mode: {:?}", config.speech_mode);

    let evaluator = Arc::new(InterviewEvaluator::new(
        interviews.clone(),
        buffer.clone(),
        llm.clone(),
        config.cost_rates,
        config.evaluation_wait,
    ));
    let turns = TurnService::new(llm, transcriber, speech, buffer, config.cost_rates);

    // Build app state
    let state = AppState {
        db: db.clone(),
        interviews,
        usage_logs: Arc::new(PgUsageLogStore::new(db)),
        evaluator,
        turns,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Picks the usage buffer backend. Redis is required once more than one
/// instance serves the same users.
async fn build_usage_buffer(config: &Config) -> Result<Arc<dyn UsageBuffer>> {
    match config.usage_buffer {
        UsageBufferBackend::Memory => {
            info!("Usage buffer: in-memory (single instance only)");
            Ok(Arc::new(InMemoryUsageBuffer::new()))
        }
        UsageBufferBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required when USAGE_BUFFER=redis")?;
            let connection = redis::Client::open(url)?
                .get_multiplexed_async_connection()
                .await
                .context("Failed to connect to Redis")?;
            info!("Usage buffer: redis");
            Ok(Arc::new(RedisUsageBuffer::new(
                connection,
                config.usage_buffer_ttl,
            )))
        }
    }
}
