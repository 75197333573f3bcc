//! Interview evaluation orchestration.
//!
//! `PENDING → LOCK_ACQUIRED → GENERATING → PARSING → PERSISTING → DONE`, with
//! any state after `LOCK_ACQUIRED` able to fall into `ROLLED_BACK`. Every
//! failure once the lock is held resets it before the error propagates, so an
//! interview is never left wedged in "evaluation in progress".

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::interview::evaluation::{parse_evaluation, Evaluation, EvaluationParseError};
use crate::interview::lock::{EvaluationGuard, EvaluationLock, LockOutcome};
use crate::interview::prompts::evaluation_prompt;
use crate::interview::store::InterviewStore;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmError, TextGenerator};
use crate::models::interview::Answer;
use crate::models::usage::{NewUsageLog, UsageLogRow};
use crate::usage::aggregate::{aggregate, reprice};
use crate::usage::buffer::{record_best_effort, UsageBuffer};
use crate::usage::cost::CostRates;
use crate::usage::record::UsageRecord;

const EVALUATE_FUNCTION: &str = "evaluate_interview";
const EVALUATE_TRANSCRIPT_FUNCTION: &str = "evaluate_transcript";
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Interview {0} not found")]
    NotFound(Uuid),

    #[error("Interview {0} is still being evaluated, try again later")]
    InProgress(Uuid),

    #[error("Evaluation generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Malformed evaluation: {0}")]
    Malformed(#[from] EvaluationParseError),

    #[error("Persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub evaluation: Evaluation,
    /// True when an earlier evaluation was returned instead of running a new one.
    pub cached: bool,
}

impl EvaluationResult {
    fn cached(evaluation: Evaluation) -> Self {
        Self {
            evaluation,
            cached: true,
        }
    }
}

pub struct InterviewEvaluator {
    interviews: Arc<dyn InterviewStore>,
    lock: EvaluationLock,
    buffer: Arc<dyn UsageBuffer>,
    llm: Arc<dyn TextGenerator>,
    rates: CostRates,
}

impl InterviewEvaluator {
    pub fn new(
        interviews: Arc<dyn InterviewStore>,
        buffer: Arc<dyn UsageBuffer>,
        llm: Arc<dyn TextGenerator>,
        rates: CostRates,
        contention_wait: Duration,
    ) -> Self {
        Self {
            lock: EvaluationLock::new(interviews.clone(), contention_wait),
            interviews,
            buffer,
            llm,
            rates,
        }
    }

    /// Evaluates a saved interview at most once, returning the stored result
    /// to every later (or concurrent, within the wait) caller.
    pub async fn evaluate(&self, interview_id: Uuid) -> Result<EvaluationResult, EvaluationError> {
        info!("Evaluation {interview_id}: PENDING");

        let interview = self
            .interviews
            .get(interview_id)
            .await
            .map_err(EvaluationError::Persistence)?
            .ok_or(EvaluationError::NotFound(interview_id))?;
        if let Some(evaluation) = interview.evaluation() {
            debug!("Evaluation {interview_id}: already evaluated, returning stored result");
            return Ok(EvaluationResult::cached(evaluation.clone()));
        }

        let mut guard = match self
            .lock
            .acquire(interview_id)
            .await
            .map_err(EvaluationError::Persistence)?
        {
            LockOutcome::Acquired(guard) => guard,
            LockOutcome::AlreadyEvaluated(evaluation) => {
                return Ok(EvaluationResult::cached(evaluation))
            }
            LockOutcome::InProgress => return Err(EvaluationError::InProgress(interview_id)),
            LockOutcome::NotFound => return Err(EvaluationError::NotFound(interview_id)),
        };
        info!("Evaluation {interview_id}: LOCK_ACQUIRED");

        match self.run_locked(&mut guard).await {
            Ok(evaluation) => {
                info!("Evaluation {interview_id}: DONE");
                Ok(EvaluationResult {
                    evaluation,
                    cached: false,
                })
            }
            Err(e) => {
                if let Err(rollback_err) = guard.rollback().await {
                    warn!("Evaluation {interview_id}: rollback failed: {rollback_err:#}");
                }
                warn!("Evaluation {interview_id}: ROLLED_BACK ({e})");
                Err(e)
            }
        }
    }

    async fn run_locked(&self, guard: &mut EvaluationGuard) -> Result<Evaluation, EvaluationError> {
        let interview = guard.interview().clone();
        let id = interview.id;

        info!("Evaluation {id}: GENERATING");
        let prompt = evaluation_prompt(&interview.category, &interview.level, &interview.answers.0);
        let generation = self.llm.generate(&prompt, JSON_ONLY_SYSTEM).await?;
        let own_record = generation.usage.as_ref().map(|usage| {
            UsageRecord::text_generation(EVALUATE_FUNCTION, &generation.model, usage, &self.rates)
        });

        info!("Evaluation {id}: PARSING");
        let evaluation = match parse_evaluation(&generation.text, &interview.answers.0) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                // The call was still paid for; leave its usage for the retry.
                if let Some(record) = own_record {
                    record_best_effort(self.buffer.as_ref(), interview.user_id, record).await;
                }
                return Err(e.into());
            }
        };

        info!("Evaluation {id}: PERSISTING");
        let mut details = match self.buffer.drain(interview.user_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Usage buffer drain failed for user {}: {e:#}", interview.user_id);
                Vec::new()
            }
        };
        details.extend(own_record);
        reprice(&mut details, &self.rates);
        let totals = aggregate(&details, &self.rates);

        let usage = NewUsageLog {
            user_id: interview.user_id,
            interview_id: id,
            category: interview.category.clone(),
            level: interview.level.clone(),
            tier: interview.tier.clone(),
            totals,
            details,
        };

        match self.commit_with_retry(guard, &evaluation, &usage).await {
            Ok(log) => {
                info!(
                    "Usage log {} for interview {id}: {} records, {} tokens, {} speech chars, {}s transcribed, total ${}",
                    log.id,
                    usage.details.len(),
                    usage.totals.total_tokens,
                    usage.totals.speech_characters,
                    usage.totals.transcription_seconds,
                    usage.totals.total_cost
                );
                Ok(evaluation)
            }
            Err(e) => {
                // Put the drained usage back so the next successful evaluation accounts for it.
                for record in usage.details {
                    record_best_effort(self.buffer.as_ref(), interview.user_id, record).await;
                }
                Err(EvaluationError::Persistence(e))
            }
        }
    }

    async fn commit_with_retry(
        &self,
        guard: &mut EvaluationGuard,
        evaluation: &Evaluation,
        usage: &NewUsageLog,
    ) -> anyhow::Result<UsageLogRow> {
        let mut attempt = 1;
        loop {
            match guard.commit(evaluation, usage).await {
                Ok(log) => return Ok(log),
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    warn!(
                        "Persisting evaluation of {} failed (attempt {attempt}/{PERSIST_ATTEMPTS}): {e:#}",
                        usage.interview_id
                    );
                    tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Evaluates an unsaved transcript. No lock and no persistence; the
    /// call's usage goes to the user's buffer like any turn-level call.
    pub async fn evaluate_transcript(
        &self,
        user_id: Uuid,
        category: &str,
        level: &str,
        answers: &[Answer],
    ) -> Result<Evaluation, EvaluationError> {
        let prompt = evaluation_prompt(category, level, answers);
        let generation = self.llm.generate(&prompt, JSON_ONLY_SYSTEM).await?;
        if let Some(usage) = generation.usage.as_ref() {
            let record = UsageRecord::text_generation(
                EVALUATE_TRANSCRIPT_FUNCTION,
                &generation.model,
                usage,
                &self.rates,
            );
            record_best_effort(self.buffer.as_ref(), user_id, record).await;
        }
        Ok(parse_evaluation(&generation.text, answers)?)
    }
}
