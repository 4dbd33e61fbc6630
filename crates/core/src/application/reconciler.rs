// Callback reconciliation: apply asynchronous results from the automation service
use crate::application::retry::RetryPolicy;
use crate::config::DispatchConfig;
use crate::domain::{JobEvent, JobId, JobOutcome, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{JobEventSink, JobStore, TimeProvider};
use crate::signature;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback body: `{ success, result?, error? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackOutcome {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// `result.score` when it is a number
    pub fn score(&self) -> Option<f64> {
        self.result.as_ref()?.get("score")?.as_f64()
    }
}

/// What a callback did to its job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileResult {
    Completed,
    RetryScheduled { next_attempt_at: i64 },
    Abandoned,
    /// Duplicate or late callback for a finished job; nothing changed
    AlreadyTerminal { status: JobStatus },
    /// Job was not awaiting a result (never dispatched, or already failed)
    Ignored { status: JobStatus },
}

/// Callback Reconciler
pub struct CallbackReconciler {
    store: Arc<dyn JobStore>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    events: Arc<dyn JobEventSink>,
    secret: Option<String>,
}

impl CallbackReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
        events: Arc<dyn JobEventSink>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            retry_policy,
            time_provider,
            events,
            secret: config.signing_secret().map(str::to_string),
        }
    }

    fn verify_signature(&self, job_id: &JobId, signature: Option<&str>, raw_body: &[u8]) -> Result<()> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(());
        };
        let valid = signature.is_some_and(|sig| signature::verify(secret, raw_body, sig));
        if !valid {
            warn!(
                job_id = %job_id,
                signature_present = signature.is_some(),
                body_len = raw_body.len(),
                "Rejected callback with invalid signature"
            );
            return Err(AppError::InvalidSignature);
        }
        Ok(())
    }

    /// Verify, then parse and apply a raw callback body
    pub async fn reconcile_raw(
        &self,
        job_id: &JobId,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<ReconcileResult> {
        self.verify_signature(job_id, signature, raw_body)?;
        let outcome: CallbackOutcome = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::Validation(format!("malformed callback body: {}", e)))?;
        self.apply(job_id, &outcome).await
    }

    /// Apply a callback outcome idempotently
    ///
    /// With a secret configured, `signature` must be the HMAC of `raw_body`.
    /// Terminal jobs are left untouched and reported as success.
    pub async fn reconcile(
        &self,
        job_id: &JobId,
        outcome: &CallbackOutcome,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<ReconcileResult> {
        self.verify_signature(job_id, signature, raw_body)?;
        self.apply(job_id, outcome).await
    }

    async fn apply(&self, job_id: &JobId, outcome: &CallbackOutcome) -> Result<ReconcileResult> {
        let job = self.store.get(job_id).await?.ok_or_else(|| {
            warn!(job_id = %job_id, "Callback for unknown job");
            AppError::UnknownJob(job_id.clone())
        })?;

        if job.status.is_terminal() {
            info!(
                job_id = %job_id,
                status = %job.status,
                success = outcome.success,
                "Ignoring callback for terminal job"
            );
            return Ok(ReconcileResult::AlreadyTerminal { status: job.status });
        }

        // Failure reports only count against the attempt in flight
        if !outcome.success && job.status != JobStatus::Processing {
            debug!(job_id = %job_id, status = %job.status, "Failure callback for idle job");
            return Ok(ReconcileResult::Ignored { status: job.status });
        }

        let transition = if outcome.success {
            JobOutcome::Completed {
                result: outcome.result.clone(),
                current_score: outcome.score(),
            }
        } else {
            let error = outcome
                .error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "callback reported failure".to_string());
            self.retry_policy.failure_outcome(&job, error)
        };

        let now = self.time_provider.now_millis();
        if !self
            .store
            .mark_result(job_id, job.attempts, &transition, now)
            .await?
        {
            // Lost a race with another writer, or the job was not awaiting a result
            let status = self
                .store
                .get(job_id)
                .await?
                .map(|j| j.status)
                .unwrap_or(job.status);
            debug!(job_id = %job_id, status = %status, "Callback did not apply");
            return Ok(if status.is_terminal() {
                ReconcileResult::AlreadyTerminal { status }
            } else {
                ReconcileResult::Ignored { status }
            });
        }

        match transition {
            JobOutcome::Completed {
                result,
                current_score,
            } => {
                info!(job_id = %job_id, score = ?current_score, "Job completed via callback");
                self.events.emit(JobEvent::Completed {
                    job_id: job.id.clone(),
                    subject_id: job.subject_id.clone(),
                    result,
                    current_score: current_score.or(job.current_score),
                    target_score: job.target_score,
                });
                Ok(ReconcileResult::Completed)
            }
            JobOutcome::RetryScheduled {
                next_attempt_at, ..
            } => Ok(ReconcileResult::RetryScheduled { next_attempt_at }),
            JobOutcome::Abandoned { error } => {
                self.events.emit(JobEvent::Abandoned {
                    job_id: job.id.clone(),
                    subject_id: job.subject_id.clone(),
                    attempts: job.attempts,
                    last_error: error,
                });
                Ok(ReconcileResult::Abandoned)
            }
            JobOutcome::Accepted => Err(AppError::Internal(
                "callback produced an acceptance outcome".to_string(),
            )),
        }
    }
}
