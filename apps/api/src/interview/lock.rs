//! Single-flight lock over an interview's evaluation.
//!
//! The only mutual-exclusion primitive is the store's conditional update
//! (`evaluated = FALSE` → `TRUE`). Nothing here holds in-process state, so the
//! guarantee extends to every process sharing the database.
//!
//! A mark left behind by a crashed holder is reclaimed by the store once it
//! is older than the stale-lock timeout. Commit and rollback only act on the
//! mark their own acquisition set, so a superseded holder cannot overwrite
//! or release the current one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::interview::evaluation::Evaluation;
use crate::interview::store::InterviewStore;
use crate::models::interview::InterviewRow;
use crate::models::usage::{NewUsageLog, UsageLogRow};

/// Result of one acquisition attempt.
pub enum LockOutcome {
    /// This caller flipped `evaluated` and must commit or roll back.
    Acquired(EvaluationGuard),
    /// Evaluation already stored (possibly by the holder we waited on).
    AlreadyEvaluated(Evaluation),
    /// Another evaluation still holds the lock after the bounded wait.
    InProgress,
    NotFound,
}

#[derive(Clone)]
pub struct EvaluationLock {
    store: Arc<dyn InterviewStore>,
    contention_wait: Duration,
}

impl EvaluationLock {
    pub fn new(store: Arc<dyn InterviewStore>, contention_wait: Duration) -> Self {
        Self {
            store,
            contention_wait,
        }
    }

    /// Attempts the conditional update. When it does not match, the row is
    /// re-read once immediately and, if still unresolved, once more after the
    /// contention wait. Never loops beyond that.
    pub async fn acquire(&self, interview_id: Uuid) -> Result<LockOutcome> {
        if let Some(interview) = self.store.try_mark_evaluating(interview_id).await? {
            debug!("Evaluation lock acquired for interview {interview_id}");
            return Ok(LockOutcome::Acquired(EvaluationGuard::new(
                self.store.clone(),
                interview,
            )));
        }

        let Some(current) = self.store.get(interview_id).await? else {
            return Ok(LockOutcome::NotFound);
        };
        if let Some(evaluation) = current.evaluation() {
            return Ok(LockOutcome::AlreadyEvaluated(evaluation.clone()));
        }

        info!(
            "Interview {interview_id} is being evaluated elsewhere, waiting {}ms",
            self.contention_wait.as_millis()
        );
        tokio::time::sleep(self.contention_wait).await;

        match self.store.get(interview_id).await? {
            None => Ok(LockOutcome::NotFound),
            Some(row) => match row.evaluation() {
                Some(evaluation) => Ok(LockOutcome::AlreadyEvaluated(evaluation.clone())),
                None => {
                    warn!("Interview {interview_id} still has no evaluation after the wait");
                    Ok(LockOutcome::InProgress)
                }
            },
        }
    }
}

/// Held lock on one interview.
///
/// Must end in [`commit`](Self::commit) or [`rollback`](Self::rollback). A
/// guard dropped while still armed (e.g. the request future was cancelled)
/// schedules the rollback on the current runtime.
pub struct EvaluationGuard {
    store: Arc<dyn InterviewStore>,
    interview: InterviewRow,
    armed: bool,
}

impl EvaluationGuard {
    fn new(store: Arc<dyn InterviewStore>, interview: InterviewRow) -> Self {
        Self {
            store,
            interview,
            armed: true,
        }
    }

    pub fn interview(&self) -> &InterviewRow {
        &self.interview
    }

    /// Writes the evaluation and usage log. The lock stays set for good on
    /// success; on error the guard stays armed so the caller may retry.
    pub async fn commit(
        &mut self,
        evaluation: &Evaluation,
        usage: &NewUsageLog,
    ) -> Result<UsageLogRow> {
        let log = self
            .store
            .complete_evaluation(
                self.interview.id,
                self.interview.evaluated_at,
                evaluation,
                usage,
            )
            .await?;
        self.armed = false;
        Ok(log)
    }

    /// Resets `evaluated = false, evaluated_at = NULL` so a later request can
    /// retry. A mark that was reclaimed by another request is left alone.
    pub async fn rollback(mut self) -> Result<()> {
        self.armed = false;
        let id = self.interview.id;
        if !self
            .store
            .reset_evaluation(id, self.interview.evaluated_at)
            .await?
        {
            warn!("Rollback of interview {id} changed nothing");
        }
        Ok(())
    }
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.interview.id;
        let marked_at = self.interview.evaluated_at;
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Evaluation of interview {id} abandoned, rolling back lock");
                handle.spawn(async move {
                    if let Err(e) = store.reset_evaluation(id, marked_at).await {
                        warn!("Deferred rollback of interview {id} failed: {e:#}");
                    }
                });
            }
            Err(_) => warn!("Evaluation of interview {id} abandoned outside a runtime; lock left set"),
        }
    }
}
