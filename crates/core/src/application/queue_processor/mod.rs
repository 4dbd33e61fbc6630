// Queue Processor - turns due jobs into dispatch attempts

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::dispatcher::{DispatchOutcome, Dispatcher};
use crate::application::recovery::StuckJobReaper;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Counts from one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reaped: usize,
    pub dispatched: usize,
    pub accepted: usize,
    pub retry_scheduled: usize,
    pub abandoned: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &Result<DispatchOutcome>) {
        match outcome {
            Ok(DispatchOutcome::Skipped) => self.skipped += 1,
            Ok(DispatchOutcome::AlreadyResolved) => self.dispatched += 1,
            Ok(DispatchOutcome::Accepted) => {
                self.dispatched += 1;
                self.accepted += 1;
            }
            Ok(DispatchOutcome::RetryScheduled { .. }) => {
                self.dispatched += 1;
                self.retry_scheduled += 1;
            }
            Ok(DispatchOutcome::Abandoned) => {
                self.dispatched += 1;
                self.abandoned += 1;
            }
            Err(_) => self.errors += 1,
        }
    }
}

/// Queue Processor
///
/// `tick` may run concurrently in several processes sharing one store; the
/// store's atomic claim keeps each attempt single-owner.
pub struct QueueProcessor {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    reaper: StuckJobReaper,
    time_provider: Arc<dyn TimeProvider>,
    batch_size: usize,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        reaper: StuckJobReaper,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let batch_size = dispatcher.config().batch_size;
        Self {
            store,
            dispatcher,
            reaper,
            time_provider,
            batch_size,
        }
    }

    /// Reap stuck jobs, then dispatch up to `batch_size` due jobs concurrently
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        // A failed sweep is retried next tick; due jobs still go out
        match self.reaper.reap().await {
            Ok(reaped) => report.reaped = reaped.total(),
            Err(e) => {
                error!(error = %e, "Stuck-job sweep failed");
                report.errors += 1;
            }
        }

        let now = self.time_provider.now_millis();
        let due = self.store.list_due(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(report);
        }

        debug!(count = due.len(), "Dispatching due jobs");
        let outcomes = join_all(due.iter().map(|job| self.dispatcher.dispatch(&job.id))).await;

        for (job, outcome) in due.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                error!(job_id = %job.id, error = %e, "Dispatch failed");
            }
            report.record(outcome);
        }

        info!(
            reaped = report.reaped,
            dispatched = report.dispatched,
            accepted = report.accepted,
            retry_scheduled = report.retry_scheduled,
            abandoned = report.abandoned,
            skipped = report.skipped,
            errors = report.errors,
            "Tick complete"
        );
        Ok(report)
    }

    /// Tick every `interval` until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken, interval: Duration) -> Result<()> {
        info!(interval_ms = interval.as_millis() as u64, "Queue processor started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let pause = match self.tick().await {
                Ok(_) => interval,
                Err(e) => {
                    error!("Tick error: {}", e);
                    ERROR_RECOVERY_SLEEP_DURATION.min(interval)
                }
            };
            tokio::select! {
                _ = sleep(pause) => {},
                _ = shutdown.wait() => {
                    info!("Queue processor interrupted while idle");
                    break;
                }
            }
        }
        info!("Queue processor stopped");
        Ok(())
    }
}
