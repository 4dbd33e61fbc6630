// Dispatcher - enqueue, dispatch and status use cases

pub mod enqueue;

pub use enqueue::EnqueueRequest;

use crate::application::retry::RetryPolicy;
use crate::config::DispatchConfig;
use crate::domain::{Job, JobEvent, JobId, JobOutcome, JobStatus, JobView};
use crate::error::{AppError, Result};
use crate::port::{DeliveryResult, IdProvider, JobEventSink, JobStore, TimeProvider, WebhookClient};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one `dispatch` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Claim failed: another worker owns the job, or it is not due
    Skipped,
    /// Endpoint accepted the job; it stays processing until the callback
    Accepted,
    RetryScheduled { next_attempt_at: i64 },
    Abandoned,
    /// A callback settled the job while the request was in flight
    AlreadyResolved,
}

/// Job counts per status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub abandoned: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed + self.abandoned
    }
}

/// Outbound webhook body
///
/// `{ subjectId, payload, metadata: { jobId, attempt, timestamp, targetScore?, callbackUrl? } }`
pub fn build_envelope(job: &Job, config: &DispatchConfig, now_millis: i64) -> serde_json::Value {
    let timestamp = DateTime::<Utc>::from_timestamp_millis(now_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();

    let mut metadata = serde_json::json!({
        "jobId": job.id,
        "attempt": job.attempts,
        "timestamp": timestamp,
    });
    if let Some(target) = job.target_score {
        metadata["targetScore"] = serde_json::json!(target);
    }
    if let Some(url) = config.callback_url(&job.id) {
        metadata["callbackUrl"] = serde_json::Value::String(url);
    }

    serde_json::json!({
        "subjectId": job.subject_id,
        "payload": job.payload.as_value(),
        "metadata": metadata,
    })
}

/// Dispatcher
///
/// Owns the per-job state machine on the sending side. Every mutation goes
/// through the store's atomic `mark_processing` / `mark_result`.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    client: Arc<dyn WebhookClient>,
    retry_policy: Arc<RetryPolicy>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    events: Arc<dyn JobEventSink>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn WebhookClient>,
        retry_policy: Arc<RetryPolicy>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        events: Arc<dyn JobEventSink>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            client,
            retry_policy,
            id_provider,
            time_provider,
            events,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Enqueue a new job
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<JobId> {
        enqueue::execute(
            self.store.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            &self.config,
            req,
        )
        .await
    }

    /// Make one delivery attempt for `job_id`
    ///
    /// Transport failures are recorded on the job and reported through the
    /// returned outcome; only storage failures are `Err`.
    pub async fn dispatch(&self, job_id: &JobId) -> Result<DispatchOutcome> {
        let now = self.time_provider.now_millis();
        if !self.store.mark_processing(job_id, now).await? {
            debug!(job_id = %job_id, "Job not claimable, skipping");
            return Ok(DispatchOutcome::Skipped);
        }

        // Claimed: read back the row with the incremented attempt count
        let job = match self.store.get(job_id).await? {
            Some(job) => job,
            None => {
                warn!(job_id = %job_id, "Job removed after claim");
                return Ok(DispatchOutcome::Skipped);
            }
        };

        info!(
            job_id = %job.id,
            subject_id = %job.subject_id,
            attempt = %job.attempts,
            "Dispatching job"
        );

        let envelope = build_envelope(&job, &self.config, now);
        let delivery = self
            .client
            .send(
                &self.config.endpoint,
                &envelope,
                self.config.signing_secret(),
                self.config.timeout(),
            )
            .await;

        let now = self.time_provider.now_millis();
        match delivery {
            DeliveryResult::Accepted { status, .. } => {
                if self
                    .store
                    .mark_result(job_id, job.attempts, &JobOutcome::Accepted, now)
                    .await?
                {
                    info!(job_id = %job_id, http_status = %status, "Job accepted, awaiting callback");
                    Ok(DispatchOutcome::Accepted)
                } else {
                    debug!(job_id = %job_id, "Job settled or reaped before delivery returned");
                    Ok(DispatchOutcome::AlreadyResolved)
                }
            }
            failure => {
                let error = failure
                    .error_message()
                    .unwrap_or_else(|| failure.kind().to_string());
                warn!(
                    job_id = %job_id,
                    kind = %failure.kind(),
                    error = %error,
                    "Delivery failed"
                );
                self.record_failure(&job, error, now).await
            }
        }
    }

    async fn record_failure(&self, job: &Job, error: String, now: i64) -> Result<DispatchOutcome> {
        let outcome = self.retry_policy.failure_outcome(job, error);
        if !self
            .store
            .mark_result(&job.id, job.attempts, &outcome, now)
            .await?
        {
            return Ok(DispatchOutcome::AlreadyResolved);
        }

        match outcome {
            JobOutcome::RetryScheduled {
                next_attempt_at, ..
            } => Ok(DispatchOutcome::RetryScheduled { next_attempt_at }),
            JobOutcome::Abandoned { error } => {
                self.events.emit(JobEvent::Abandoned {
                    job_id: job.id.clone(),
                    subject_id: job.subject_id.clone(),
                    attempts: job.attempts,
                    last_error: error,
                });
                Ok(DispatchOutcome::Abandoned)
            }
            other => Err(AppError::Internal(format!(
                "unexpected failure outcome {:?}",
                other
            ))),
        }
    }

    /// Read-only projection of a job
    pub async fn get_status(&self, job_id: &JobId) -> Result<JobView> {
        self.store
            .get(job_id)
            .await?
            .map(|job| job.view())
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", job_id)))
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for status in JobStatus::ALL {
            let count = self.store.count_by_status(status).await?;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Abandoned => stats.abandoned = count,
            }
        }
        Ok(stats)
    }
}
