// Stuck-job recovery: processing jobs whose callback never arrived
use crate::application::retry::RetryPolicy;
use crate::domain::{Job, JobEvent, JobOutcome};
use crate::port::{JobEventSink, JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Error recorded on a job reaped for a missing callback
pub const CALLBACK_TIMEOUT_ERROR: &str = "callback timeout";

/// Upper bound on jobs reaped per pass
pub const DEFAULT_REAP_LIMIT: usize = 100;

/// Result of one reaping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub requeued: usize,
    pub abandoned: usize,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.requeued + self.abandoned
    }
}

/// Stuck-job reaper
///
/// A job that stays `processing` longer than the grace window is treated as
/// a transport failure: requeued through the RetryPolicy, or abandoned when
/// its attempts are spent.
pub struct StuckJobReaper {
    store: Arc<dyn JobStore>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    events: Arc<dyn JobEventSink>,
    grace_ms: i64,
    limit: usize,
}

impl StuckJobReaper {
    /// Create a new reaper
    ///
    /// # Arguments
    /// * `store` - Job store
    /// * `retry_policy` - Shared retry computation
    /// * `time_provider` - Time provider
    /// * `events` - Sink for abandon events
    /// * `grace_ms` - How long a job may wait for its callback
    pub fn new(
        store: Arc<dyn JobStore>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
        events: Arc<dyn JobEventSink>,
        grace_ms: u64,
    ) -> Self {
        Self {
            store,
            retry_policy,
            time_provider,
            events,
            grace_ms: i64::try_from(grace_ms).unwrap_or(i64::MAX),
            limit: DEFAULT_REAP_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Reap processing jobs dispatched before `now - grace`
    pub async fn reap(&self) -> crate::error::Result<ReapReport> {
        let now = self.time_provider.now_millis();
        let cutoff = now.saturating_sub(self.grace_ms);

        let stuck = self.store.find_stuck(cutoff, self.limit).await?;
        let mut report = ReapReport::default();
        if stuck.is_empty() {
            return Ok(report);
        }

        info!(
            count = stuck.len(),
            cutoff = %cutoff,
            grace_ms = %self.grace_ms,
            "Reaping stuck jobs"
        );

        for job in stuck {
            match self.reap_single_job(&job, now).await? {
                Some(JobOutcome::Abandoned { .. }) => report.abandoned += 1,
                Some(_) => report.requeued += 1,
                None => {}
            }
        }

        Ok(report)
    }

    /// Returns the applied outcome, or None when the job moved on meanwhile
    async fn reap_single_job(&self, job: &Job, now: i64) -> crate::error::Result<Option<JobOutcome>> {
        warn!(
            job_id = %job.id,
            dispatched_at = ?job.dispatched_at,
            attempts = %job.attempts,
            "No callback within grace window"
        );

        let outcome = self.retry_policy.failure_outcome(job, CALLBACK_TIMEOUT_ERROR);
        // A callback may have landed since find_stuck
        if !self
            .store
            .mark_result(&job.id, job.attempts, &outcome, now)
            .await?
        {
            return Ok(None);
        }

        if let JobOutcome::Abandoned { error } = &outcome {
            self.events.emit(JobEvent::Abandoned {
                job_id: job.id.clone(),
                subject_id: job.subject_id.clone(),
                attempts: job.attempts,
                last_error: error.clone(),
            });
        }
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPayload, JobStatus};
    use crate::port::event_sink::mocks::RecordingEventSink;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::InMemoryJobStore;
    use serde_json::json;

    const GRACE: u64 = 600_000;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        clock: Arc<ManualTimeProvider>,
        events: Arc<RecordingEventSink>,
        reaper: StuckJobReaper,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = Arc::new(ManualTimeProvider::new(0));
        let events = Arc::new(RecordingEventSink::new());
        let reaper = StuckJobReaper::new(
            store.clone(),
            Arc::new(RetryPolicy::with_seed(clock.clone(), 5_000, 300_000, 9)),
            clock.clone(),
            events.clone(),
            GRACE,
        );
        Harness {
            store,
            clock,
            events,
            reaper,
        }
    }

    async fn dispatched(store: &InMemoryJobStore, id: &str, max_attempts: i32, at: i64) {
        let job = Job::new(id, 0, id, JobPayload::new(json!({"k": 1})), max_attempts);
        store.insert(&job).await.unwrap();
        assert!(store.mark_processing(&job.id, at).await.unwrap());
    }

    #[tokio::test]
    async fn test_job_within_grace_untouched() {
        let h = harness();
        dispatched(&h.store, "a", 3, 1_000).await;
        h.clock.set(1_000 + GRACE as i64);

        let report = h.reaper.reap().await.unwrap();
        assert_eq!(report.total(), 0);
        let job = h.store.get(&"a".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_stuck_job_requeued_with_backoff() {
        let h = harness();
        dispatched(&h.store, "a", 3, 1_000).await;
        h.clock.set(1_001 + GRACE as i64);

        let report = h.reaper.reap().await.unwrap();
        assert_eq!(report, ReapReport { requeued: 1, abandoned: 0 });

        let job = h.store.get(&"a".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some(CALLBACK_TIMEOUT_ERROR));
        assert!(job.next_attempt_at > h.clock.now_millis());
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_stuck_job_on_last_attempt_abandoned() {
        let h = harness();
        dispatched(&h.store, "a", 1, 1_000).await;
        h.clock.set(2_000 + GRACE as i64);

        let report = h.reaper.reap().await.unwrap();
        assert_eq!(report, ReapReport { requeued: 0, abandoned: 1 });

        let job = h.store.get(&"a".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Abandoned);
        assert_eq!(h.events.events().len(), 1);
    }

    #[tokio::test]
    async fn test_reap_respects_limit() {
        let h = harness();
        for id in ["a", "b", "c"] {
            dispatched(&h.store, id, 3, 1_000).await;
        }
        h.clock.set(10 * GRACE as i64);

        let reaper = h.reaper.with_limit(2);
        assert_eq!(reaper.reap().await.unwrap().total(), 2);
        assert_eq!(reaper.reap().await.unwrap().total(), 1);
        assert_eq!(reaper.reap().await.unwrap().total(), 0);
    }
}
