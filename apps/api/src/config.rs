use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::speech::SpeechMode;
use crate::usage::cost::CostRates;

/// Default transcription endpoint (whisper-v3 hosted on Fireworks).
const DEFAULT_WHISPER_API_URL: &str = "https://audio-prod.api.fireworks.ai/v1/audio/transcriptions";

/// Where the per-user session usage buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageBufferBackend {
    /// Process-local map. Buffered usage is invisible to other instances.
    Memory,
    /// Shared Redis lists, safe for multi-instance deployments.
    Redis,
}

impl FromStr for UsageBufferBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => bail!("USAGE_BUFFER must be 'memory' or 'redis', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup aborts if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub whisper_api_key: String,
    pub whisper_api_url: String,
    pub elevenlabs_api_key: Option<String>,
    pub speech_mode: SpeechMode,
    pub usage_buffer: UsageBufferBackend,
    pub redis_url: Option<String>,
    pub usage_buffer_ttl: Duration,
    /// How long a contended evaluation request waits before re-reading once.
    pub evaluation_wait: Duration,
    /// Age after which an evaluating mark with no evaluation is taken over.
    pub evaluation_lock_ttl: Duration,
    pub cost_rates: CostRates,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let speech_mode: SpeechMode = optional_env("SPEECH_MODE")
            .unwrap_or_else(|| "simulate".to_string())
            .parse()?;
        let elevenlabs_api_key = optional_env("ELEVENLABS_API_KEY");
        if speech_mode == SpeechMode::Live && elevenlabs_api_key.is_none() {
            bail!("ELEVENLABS_API_KEY is required when SPEECH_MODE=live");
        }

        let usage_buffer: UsageBufferBackend = optional_env("USAGE_BUFFER")
            .unwrap_or_else(|| "memory".to_string())
            .parse()?;
        let redis_url = optional_env("REDIS_URL");
        if usage_buffer == UsageBufferBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL is required when USAGE_BUFFER=redis");
        }

        let defaults = CostRates::default();
        let cost_rates = CostRates {
            text_input_per_million: parse_env_or(
                "COST_TEXT_INPUT_PER_MILLION",
                defaults.text_input_per_million,
            )?,
            text_output_per_million: parse_env_or(
                "COST_TEXT_OUTPUT_PER_MILLION",
                defaults.text_output_per_million,
            )?,
            speech_per_character: parse_env_or("COST_SPEECH_PER_CHAR", defaults.speech_per_character)?,
            transcription_per_second: parse_env_or(
                "COST_TRANSCRIPTION_PER_SECOND",
                defaults.transcription_per_second,
            )?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            whisper_api_key: require_env("WHISPER_API_KEY")?,
            whisper_api_url: optional_env("WHISPER_API_URL")
                .unwrap_or_else(|| DEFAULT_WHISPER_API_URL.to_string()),
            elevenlabs_api_key,
            speech_mode,
            usage_buffer,
            redis_url,
            usage_buffer_ttl: Duration::from_secs(parse_env_or("USAGE_BUFFER_TTL_SECS", 86_400u64)?),
            evaluation_wait: Duration::from_millis(parse_env_or("EVALUATION_WAIT_MS", 2_000u64)?),
            evaluation_lock_ttl: Duration::from_secs(parse_env_or("EVALUATION_LOCK_TTL_SECS", 600u64)?),
            cost_rates,
            port: parse_env_or("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
