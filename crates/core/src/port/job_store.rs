// Job Store Port (Interface)

use crate::domain::{Job, JobId, JobOutcome, JobStatus};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable, queryable storage of Job records with atomic status transitions.
///
/// All mutation of shared job state goes through `mark_processing` and
/// `mark_result`; implementations must make each of them a single atomic
/// operation so several processes can share one store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job.
    ///
    /// Fails with `AppError::DuplicateSubject` when the subject already has an
    /// active (`pending`, `processing` or `failed`) job.
    async fn insert(&self, job: &Job) -> Result<JobId>;

    /// Find job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Jobs ready for dispatch: `pending`, or `failed` with attempts left and
    /// an open backoff gate. Ordered by priority desc, created_at asc, then
    /// insertion order.
    async fn list_due(&self, now: i64, limit: usize) -> Result<Vec<Job>>;

    /// Atomically claim a job for one dispatch attempt.
    ///
    /// Moves a claimable job to `processing`, increments `attempts` and stamps
    /// `dispatched_at`. Returns false if the job is missing, terminal, already
    /// processing, out of attempts, or still inside its backoff window.
    async fn mark_processing(&self, id: &JobId, now: i64) -> Result<bool>;

    /// Apply an outcome computed for attempt number `attempt`.
    ///
    /// Returns false (a no-op, not an error) when the job is terminal, not in
    /// a source state for the outcome, or no longer on `attempt` because it
    /// was claimed again after the caller read it.
    async fn mark_result(
        &self,
        id: &JobId,
        attempt: i32,
        outcome: &JobOutcome,
        now: i64,
    ) -> Result<bool>;

    /// Delete a job record (archival)
    async fn remove(&self, id: &JobId) -> Result<bool>;

    /// Processing jobs claimed before `cutoff` (candidates for stuck-job reaping)
    async fn find_stuck(&self, cutoff: i64, limit: usize) -> Result<Vec<Job>>;

    /// Active job for a subject, if any
    async fn find_active_by_subject(&self, subject_id: &str) -> Result<Option<Job>>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}

fn is_active(status: JobStatus) -> bool {
    !status.is_terminal()
}

/// In-memory JobStore.
///
/// A single mutex serializes every operation, which makes the claim atomic
/// within one process. Used by unit tests and embedded setups.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, (u64, Job)>,
    next_seq: u64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("job store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<JobId> {
        let mut state = self.lock()?;

        if state.jobs.contains_key(&job.id) {
            return Err(AppError::Database(format!(
                "Unique constraint violation: job {} exists",
                job.id
            )));
        }
        let duplicate = state
            .jobs
            .values()
            .any(|(_, j)| j.subject_id == job.subject_id && is_active(j.status));
        if duplicate {
            return Err(AppError::DuplicateSubject(job.subject_id.clone()));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(job.id.clone(), (seq, job.clone()));
        Ok(job.id.clone())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let state = self.lock()?;
        Ok(state.jobs.get(id).map(|(_, j)| j.clone()))
    }

    async fn list_due(&self, now: i64, limit: usize) -> Result<Vec<Job>> {
        let state = self.lock()?;
        let mut due: Vec<&(u64, Job)> = state
            .jobs
            .values()
            .filter(|(_, j)| j.is_due(now))
            .collect();

        due.sort_by(|(seq_a, a), (seq_b, b)| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.created_at.cmp(&b.created_at))
                .then(seq_a.cmp(seq_b))
        });

        Ok(due.into_iter().take(limit).map(|(_, j)| j.clone()).collect())
    }

    async fn mark_processing(&self, id: &JobId, now: i64) -> Result<bool> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(id) {
            Some((_, job)) => Ok(job.claim(now).is_ok()),
            None => Ok(false),
        }
    }

    async fn mark_result(
        &self,
        id: &JobId,
        attempt: i32,
        outcome: &JobOutcome,
        now: i64,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(id) {
            Some((_, job)) => Ok(job.apply(attempt, outcome, now)),
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &JobId) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state.jobs.remove(id).is_some())
    }

    async fn find_stuck(&self, cutoff: i64, limit: usize) -> Result<Vec<Job>> {
        let state = self.lock()?;
        let mut stuck: Vec<Job> = state
            .jobs
            .values()
            .filter(|(_, j)| {
                j.status == JobStatus::Processing && j.dispatched_at.is_some_and(|d| d < cutoff)
            })
            .map(|(_, j)| j.clone())
            .collect();
        stuck.sort_by_key(|j| j.dispatched_at);
        stuck.truncate(limit);
        Ok(stuck)
    }

    async fn find_active_by_subject(&self, subject_id: &str) -> Result<Option<Job>> {
        let state = self.lock()?;
        Ok(state
            .jobs
            .values()
            .find(|(_, j)| j.subject_id == subject_id && is_active(j.status))
            .map(|(_, j)| j.clone()))
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let state = self.lock()?;
        Ok(state.jobs.values().filter(|(_, j)| j.status == status).count() as i64)
    }
}
