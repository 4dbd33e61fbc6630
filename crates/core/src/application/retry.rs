// Retry logic: exponential backoff with jitter
use crate::config::DispatchConfig;
use crate::domain::{Job, JobOutcome};
use crate::port::TimeProvider;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry once `next_attempt_at` (epoch ms) is reached
    Retry { next_attempt_at: i64 },
    /// Attempts exhausted; the job is abandoned
    Abandon,
}

/// Backoff before jitter: `min(cap, base * 2^attempts)`, saturating
pub fn backoff_delay_ms(attempts: i32, base_delay_ms: u64, cap_ms: u64) -> u64 {
    let exp = attempts.clamp(0, 62) as u32;
    base_delay_ms
        .checked_mul(1u64 << exp)
        .unwrap_or(u64::MAX)
        .min(cap_ms)
}

/// Retry policy
///
/// Decides whether a failed dispatch is retried and when:
/// - `retry = attempts < max_attempts`
/// - `next_attempt_at = now + min(cap, base * 2^attempts) + uniform(0, base)`
///
/// Clock and RNG are injected so results are reproducible in tests.
pub struct RetryPolicy {
    time_provider: Arc<dyn TimeProvider>,
    base_delay_ms: u64,
    cap_ms: u64,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    /// Create a new retry policy seeded from OS entropy
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for current time
    /// * `base_delay_ms` - Base delay in milliseconds (also the jitter span)
    /// * `cap_ms` - Ceiling applied to the exponential term
    pub fn new(time_provider: Arc<dyn TimeProvider>, base_delay_ms: u64, cap_ms: u64) -> Self {
        Self::with_rng(time_provider, base_delay_ms, cap_ms, StdRng::from_entropy())
    }

    /// Deterministic policy for tests
    pub fn with_seed(
        time_provider: Arc<dyn TimeProvider>,
        base_delay_ms: u64,
        cap_ms: u64,
        seed: u64,
    ) -> Self {
        Self::with_rng(time_provider, base_delay_ms, cap_ms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        time_provider: Arc<dyn TimeProvider>,
        base_delay_ms: u64,
        cap_ms: u64,
        rng: StdRng,
    ) -> Self {
        Self {
            time_provider,
            base_delay_ms,
            cap_ms,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(time_provider: Arc<dyn TimeProvider>, config: &DispatchConfig) -> Self {
        Self::new(time_provider, config.base_delay_ms, config.backoff_cap_ms)
    }

    fn jitter_ms(&self) -> u64 {
        if self.base_delay_ms == 0 {
            return 0;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..=self.base_delay_ms),
            // A poisoned RNG only loses jitter, never the retry itself
            Err(poisoned) => poisoned.into_inner().gen_range(0..=self.base_delay_ms),
        }
    }

    /// Decide what happens after a failed attempt
    ///
    /// `attempts` is the count including the attempt that just failed.
    pub fn on_failure(&self, attempts: i32, max_attempts: i32) -> RetryDecision {
        if attempts >= max_attempts {
            return RetryDecision::Abandon;
        }

        let now = self.time_provider.now_millis();
        let delay = backoff_delay_ms(attempts, self.base_delay_ms, self.cap_ms)
            .saturating_add(self.jitter_ms());
        let delay = i64::try_from(delay).unwrap_or(i64::MAX);

        RetryDecision::Retry {
            next_attempt_at: now.saturating_add(delay),
        }
    }

    /// Outcome for a failed job; the one computation shared by the
    /// dispatcher, callback reconciliation and stuck-job reaping
    pub fn failure_outcome(&self, job: &Job, error: impl Into<String>) -> JobOutcome {
        let error = error.into();
        match self.on_failure(job.attempts, job.max_attempts) {
            RetryDecision::Retry { next_attempt_at } => {
                info!(
                    job_id = %job.id,
                    attempt = %job.attempts,
                    max_attempts = %job.max_attempts,
                    next_attempt_at = %next_attempt_at,
                    error = %error,
                    "Scheduling retry"
                );
                JobOutcome::RetryScheduled {
                    error,
                    next_attempt_at,
                }
            }
            RetryDecision::Abandon => {
                warn!(
                    job_id = %job.id,
                    attempts = %job.attempts,
                    max_attempts = %job.max_attempts,
                    error = %error,
                    "Max attempts reached, abandoning job"
                );
                JobOutcome::Abandoned { error }
            }
        }
    }
}
