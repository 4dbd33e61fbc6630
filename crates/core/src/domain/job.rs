// Job Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Job ID (UUID v4)
pub type JobId = String;

/// Identifier of the content item being optimized (opaque to the core)
pub type SubjectId = String;

/// Maximum characters of `last_error` exposed through status queries
pub const MAX_VISIBLE_ERROR_LEN: usize = 512;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Abandoned,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Abandoned,
    ];

    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Abandoned)
    }

    /// Allowed edges of the dispatch state machine.
    ///
    /// The claim moves `Pending`/`Failed` straight to `Processing`, so a send
    /// failure surfaces as `Processing -> Failed` and the requeue edge
    /// `Failed -> Pending` is folded into `Failed -> Processing`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Abandoned)
                | (Failed, Processing)
                | (Failed, Failed)
                | (Failed, Completed)
                | (Failed, Abandoned)
        )
    }

    /// Statuses a `JobOutcome` landing in `target` may be applied from.
    /// A subset of `can_transition_to`; claim edges are handled by `Job::claim`.
    pub fn sources_for(target: JobStatus) -> &'static [JobStatus] {
        match target {
            JobStatus::Processing | JobStatus::Failed | JobStatus::Abandoned => {
                &[JobStatus::Processing]
            }
            // A late success for a job waiting on its retry still counts
            JobStatus::Completed => &[JobStatus::Processing, JobStatus::Failed],
            JobStatus::Pending => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "abandoned" => Ok(JobStatus::Abandoned),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Queue pop ordering hint (never affects correctness)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Numeric rank stored in the database (higher pops first)
    pub fn rank(self) -> i32 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }

    pub fn from_rank(rank: i32) -> Self {
        match rank {
            i32::MIN..=0 => Priority::Low,
            1 => Priority::Normal,
            _ => Priority::High,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(DomainError::InvalidPriority(other.to_string())),
        }
    }
}

/// Job Payload (JSON serializable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub subject_id: SubjectId,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub priority: Priority,

    // Retry bookkeeping
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: i64, // epoch ms, backoff gate

    // Lifecycle timestamps (epoch ms)
    pub created_at: i64,
    pub updated_at: i64,
    pub dispatched_at: Option<i64>,
    pub finished_at: Option<i64>,

    pub last_error: Option<String>,

    // Progress vs goal metric
    pub current_score: Option<f64>,
    pub target_score: Option<f64>,

    /// Result object reported by a successful callback
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new pending Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `subject_id` - Content item the job optimizes
    /// * `payload` - Data sent to the automation endpoint
    /// * `max_attempts` - Dispatch attempt ceiling
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        subject_id: impl Into<String>,
        payload: JobPayload,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            payload,
            status: JobStatus::Pending,
            priority: Priority::Normal,
            attempts: 0,
            max_attempts,
            next_attempt_at: created_at,
            created_at,
            updated_at: created_at,
            dispatched_at: None,
            finished_at: None,
            last_error: None,
            current_score: None,
            target_score: None,
            result: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp.
    ///
    /// IDs are `test-1`, `test-2`, ...; timestamps start at 1000 and
    /// increment by 1000. Production code injects ID and time via providers.
    pub fn new_test(subject_id: impl Into<String>, payload: JobPayload) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(id, created_at, subject_id, payload, 3)
    }

    /// Whether the job may be claimed for dispatch at `now`
    pub fn is_claimable(&self, now: i64) -> bool {
        match self.status {
            JobStatus::Pending => self.attempts < self.max_attempts,
            JobStatus::Failed => self.attempts < self.max_attempts && self.next_attempt_at <= now,
            _ => false,
        }
    }

    /// Whether the job shows up in a due-jobs listing at `now`
    pub fn is_due(&self, now: i64) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Failed => self.attempts < self.max_attempts && self.next_attempt_at <= now,
            _ => false,
        }
    }

    /// Claim the job for a dispatch attempt (counts the attempt)
    pub fn claim(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if !self.is_claimable(now_millis) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.dispatched_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Apply an outcome computed against attempt number `attempt`.
    ///
    /// Returns false when the edge is not allowed (terminal job,
    /// never-dispatched job, or `Accepted` after the job already left
    /// `Processing`) or when the job has been claimed again since the
    /// outcome was computed.
    pub fn apply(&mut self, attempt: i32, outcome: &JobOutcome, now_millis: i64) -> bool {
        if self.attempts != attempt {
            return false;
        }
        if !JobStatus::sources_for(outcome.target_status()).contains(&self.status) {
            return false;
        }
        match outcome {
            JobOutcome::Accepted => {
                self.last_error = None;
            }
            JobOutcome::Completed {
                result,
                current_score,
            } => {
                self.status = JobStatus::Completed;
                self.result = result.clone();
                if current_score.is_some() {
                    self.current_score = *current_score;
                }
                self.last_error = None;
                self.finished_at = Some(now_millis);
            }
            JobOutcome::RetryScheduled {
                error,
                next_attempt_at,
            } => {
                self.status = JobStatus::Failed;
                self.last_error = Some(error.clone());
                self.next_attempt_at = (*next_attempt_at).max(now_millis);
            }
            JobOutcome::Abandoned { error } => {
                self.status = JobStatus::Abandoned;
                self.last_error = Some(error.clone());
                self.finished_at = Some(now_millis);
            }
        }
        self.updated_at = now_millis;
        true
    }

    /// Read-only projection for status queries
    pub fn view(&self) -> JobView {
        JobView::from(self)
    }
}

/// Transition applied through `JobStore::mark_result`
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Delivery accepted by the endpoint; the job awaits its callback
    Accepted,
    /// Callback reported success
    Completed {
        result: Option<serde_json::Value>,
        current_score: Option<f64>,
    },
    /// Failure with attempts remaining
    RetryScheduled { error: String, next_attempt_at: i64 },
    /// Failure with attempts exhausted
    Abandoned { error: String },
}

impl JobOutcome {
    /// Status the job lands in after the outcome applies
    pub fn target_status(&self) -> JobStatus {
        match self {
            JobOutcome::Accepted => JobStatus::Processing,
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::RetryScheduled { .. } => JobStatus::Failed,
            JobOutcome::Abandoned { .. } => JobStatus::Abandoned,
        }
    }
}

/// Status query projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub subject_id: SubjectId,
    pub status: JobStatus,
    pub priority: Priority,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,
    pub current_score: Option<f64>,
    pub target_score: Option<f64>,
    pub result: Option<serde_json::Value>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let last_error = job
            .last_error
            .as_ref()
            .map(|e| e.chars().take(MAX_VISIBLE_ERROR_LEN).collect());

        Self {
            id: job.id.clone(),
            subject_id: job.subject_id.clone(),
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            next_attempt_at: job.next_attempt_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            last_error,
            current_score: job.current_score,
            target_score: job.target_score,
            result: job.result.clone(),
        }
    }
}
