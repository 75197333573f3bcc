//! In-memory stand-ins for the database and the external capabilities.
//! Each implements the same trait as its production counterpart.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::types::Json;
use uuid::Uuid;

use crate::interview::evaluation::Evaluation;
use crate::interview::store::{to_i64, InterviewStore};
use crate::llm_client::{Generation, LlmError, TextGenerator, TokenUsage};
use crate::models::interview::{Answer, InterviewRow, NewInterview};
use crate::models::usage::{NewUsageLog, UsageLogRow, UsageStats};
use crate::speech::{AudioClip, SpeechError, SpeechSynthesizer, Transcriber};
use crate::usage::aggregate::UsageTotals;
use crate::usage::store::UsageLogStore;

// ────────────────────────────────────────────────────────────────────────────
// Interview + usage log store
// ────────────────────────────────────────────────────────────────────────────

/// Emulates the Postgres conditional updates under a single mutex.
#[derive(Default)]
pub struct MemoryInterviewStore {
    interviews: Mutex<HashMap<Uuid, InterviewRow>>,
    logs: Mutex<Vec<UsageLogRow>>,
    failing_completions: AtomicU32,
    completion_attempts: AtomicU32,
    stale_lock_after: Option<Duration>,
}

impl MemoryInterviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks older than `after` without an evaluation can be reclaimed.
    /// Without this, a mark is held until reset.
    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = Some(after);
        self
    }

    pub fn seed_interview(&self, user_id: Uuid, answers: Vec<Answer>) -> InterviewRow {
        let row = InterviewRow {
            id: Uuid::new_v4(),
            user_id,
            category_id: Uuid::new_v4(),
            category: "Backend Engineer".to_string(),
            level: "junior".to_string(),
            tier: "free".to_string(),
            questions: Json(vec![]),
            answers: Json(answers),
            completed_at: Utc::now(),
            evaluated: false,
            evaluation: None,
            evaluated_at: None,
        };
        self.interviews.lock().insert(row.id, row.clone());
        row
    }

    pub fn set_evaluation(&self, id: Uuid, evaluation: Evaluation) {
        if let Some(row) = self.interviews.lock().get_mut(&id) {
            row.evaluated = true;
            row.evaluated_at = Some(Utc::now());
            row.evaluation = Some(Json(evaluation));
        }
    }

    pub fn row(&self, id: Uuid) -> InterviewRow {
        self.interviews.lock()[&id].clone()
    }

    pub fn usage_logs(&self) -> Vec<UsageLogRow> {
        self.logs.lock().clone()
    }

    /// The next `count` calls to `complete_evaluation` fail without writing.
    pub fn fail_next_completions(&self, count: u32) {
        self.failing_completions.store(count, Ordering::SeqCst);
    }

    pub fn completion_attempts(&self) -> u32 {
        self.completion_attempts.load(Ordering::SeqCst)
    }

    fn is_stale(&self, row: &InterviewRow) -> bool {
        let (Some(after), Some(marked_at)) = (self.stale_lock_after, row.evaluated_at) else {
            return false;
        };
        match chrono::Duration::from_std(after) {
            Ok(after) => row.evaluation.is_none() && marked_at < Utc::now() - after,
            Err(_) => false,
        }
    }

    pub fn push_usage_log(&self, user_id: Uuid, total_tokens: i64) -> UsageLogRow {
        self.push_usage_log_for(user_id, Uuid::new_v4(), total_tokens)
    }

    /// A log already attached to `interview_id`, as left by older releases.
    pub fn push_usage_log_for(&self, user_id: Uuid, interview_id: Uuid, total_tokens: i64) -> UsageLogRow {
        let log = UsageLogRow {
            id: Uuid::new_v4(),
            user_id,
            interview_id,
            category: "Backend Engineer".to_string(),
            level: "junior".to_string(),
            tier: "free".to_string(),
            total_tokens,
            total_text_cost: Default::default(),
            total_speech_characters: 0,
            total_speech_cost: Default::default(),
            total_transcription_seconds: 0,
            total_transcription_cost: Default::default(),
            total_cost: Default::default(),
            details: Json(vec![]),
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        };
        self.logs.lock().push(log.clone());
        log
    }
}

#[async_trait]
impl InterviewStore for MemoryInterviewStore {
    async fn create(&self, interview: NewInterview) -> Result<InterviewRow> {
        let mut row = self.seed_interview(interview.user_id, interview.answers);
        row.category_id = interview.category_id;
        row.category = interview.category;
        row.level = interview.level;
        row.tier = interview.tier;
        row.questions = Json(interview.questions);
        self.interviews.lock().insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<InterviewRow>> {
        Ok(self.interviews.lock().get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<InterviewRow>> {
        let mut rows: Vec<_> = self
            .interviews
            .lock()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(rows)
    }

    async fn try_mark_evaluating(&self, id: Uuid) -> Result<Option<InterviewRow>> {
        let mut interviews = self.interviews.lock();
        match interviews.get_mut(&id) {
            Some(row) if !row.evaluated || self.is_stale(row) => {
                row.evaluated = true;
                row.evaluated_at = Some(Utc::now());
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_evaluation(
        &self,
        id: Uuid,
        marked_at: Option<DateTime<Utc>>,
        evaluation: &Evaluation,
        usage: &NewUsageLog,
    ) -> Result<UsageLogRow> {
        self.completion_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_completions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_completions.store(remaining - 1, Ordering::SeqCst);
            bail!("simulated write failure");
        }

        let mut interviews = self.interviews.lock();
        let row = interviews
            .get_mut(&id)
            .ok_or_else(|| anyhow!("interview {id} not found"))?;
        if !row.evaluated || row.evaluation.is_some() || row.evaluated_at != marked_at {
            bail!("interview {id} is no longer marked as evaluating by this holder");
        }

        let mut logs = self.logs.lock();
        if let Some(existing) = logs.iter_mut().find(|l| l.interview_id == usage.interview_id) {
            existing.total_tokens += to_i64(usage.totals.total_tokens);
            existing.total_text_cost += usage.totals.text_cost;
            existing.total_speech_characters += to_i64(usage.totals.speech_characters);
            existing.total_speech_cost += usage.totals.speech_cost;
            existing.total_transcription_seconds += to_i64(usage.totals.transcription_seconds);
            existing.total_transcription_cost += usage.totals.transcription_cost;
            existing.total_cost += usage.totals.total_cost;
            existing.details.0.extend(usage.details.iter().cloned());
            existing.completed_at = existing.completed_at.or(Some(Utc::now()));
            let merged = existing.clone();
            row.evaluation = Some(Json(evaluation.clone()));
            return Ok(merged);
        }
        let log = UsageLogRow {
            id: Uuid::new_v4(),
            user_id: usage.user_id,
            interview_id: usage.interview_id,
            category: usage.category.clone(),
            level: usage.level.clone(),
            tier: usage.tier.clone(),
            total_tokens: to_i64(usage.totals.total_tokens),
            total_text_cost: usage.totals.text_cost,
            total_speech_characters: to_i64(usage.totals.speech_characters),
            total_speech_cost: usage.totals.speech_cost,
            total_transcription_seconds: to_i64(usage.totals.transcription_seconds),
            total_transcription_cost: usage.totals.transcription_cost,
            total_cost: usage.totals.total_cost,
            details: Json(usage.details.clone()),
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        };
        logs.push(log.clone());
        row.evaluation = Some(Json(evaluation.clone()));
        Ok(log)
    }

    async fn reset_evaluation(&self, id: Uuid, marked_at: Option<DateTime<Utc>>) -> Result<bool> {
        let mut interviews = self.interviews.lock();
        match interviews.get_mut(&id) {
            Some(row) if row.evaluation.is_none() && row.evaluated_at == marked_at => {
                row.evaluated = false;
                row.evaluated_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UsageLogStore for MemoryInterviewStore {
    async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<UsageLogRow>, i64)> {
        let mut logs: Vec<_> = self
            .logs
            .lock()
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = logs.len() as i64;
        let offset = (page.saturating_sub(1) * limit) as usize;
        Ok((
            logs.into_iter().skip(offset).take(limit as usize).collect(),
            total,
        ))
    }

    async fn stats_for_user(&self, user_id: Uuid) -> Result<UsageStats> {
        let logs = self.logs.lock();
        let tokens: Vec<i64> = logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.total_tokens)
            .collect();
        let total: i64 = tokens.iter().sum();
        let count = tokens.len() as i64;
        Ok(UsageStats {
            total_tokens_all_time: total,
            total_interviews: count,
            avg_tokens_per_interview: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
        })
    }
}

/// A minimal usage log for `row`, for tests that only exercise the lock.
pub fn sample_usage_log(row: &InterviewRow) -> NewUsageLog {
    NewUsageLog {
        user_id: row.user_id,
        interview_id: row.id,
        category: row.category.clone(),
        level: row.level.clone(),
        tier: row.tier.clone(),
        totals: UsageTotals::default(),
        details: vec![],
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Capability fakes
// ────────────────────────────────────────────────────────────────────────────

pub fn usage(input: u32, output: u32) -> TokenUsage {
    TokenUsage {
        input_tokens: input,
        output_tokens: output,
        reasoning_tokens: None,
    }
}

/// Replies from a queue, then repeats `fallback` forever. Counts calls.
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<Generation, LlmError>>>,
    fallback: Generation,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn replying(text: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Generation {
                text: text.into(),
                usage,
                model: "test-model".to_string(),
            },
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues one failed call ahead of the fallback.
    pub fn failing_once(self, error: LlmError) -> Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    /// Queues one reply ahead of the fallback.
    pub fn then_reply(self, text: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        self.queue.lock().push_back(Ok(Generation {
            text: text.into(),
            usage,
            model: "test-model".to_string(),
        }));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str, _system: &str) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub struct FixedTranscriber(pub String);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SpeechError> {
        Ok(self.0.clone())
    }
}

/// Returns a fixed clip and counts calls.
#[derive(Default)]
pub struct CountingSynthesizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for CountingSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Bytes, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"ID3audio"))
    }
}

/// Always fails with a provider error.
pub struct FailingSynthesizer {
    pub status: u16,
}

#[async_trait]
impl SpeechSynthesizer for FailingSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Bytes, SpeechError> {
        Err(SpeechError::Provider {
            status: self.status,
            message: "service unavailable".to_string(),
        })
    }
}
