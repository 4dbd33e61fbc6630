// Maintenance Service
// Scheduled retention sweep for finished jobs

use crate::application::queue_processor::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Maintenance scheduler
///
/// Runs periodic maintenance (GC of finished jobs, VACUUM) in the background
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    config: MaintenanceConfig,
    every: Duration,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `maintenance` - Maintenance implementation
    /// * `config` - Maintenance configuration
    /// * `every` - How often to run maintenance
    pub fn new(maintenance: Arc<dyn Maintenance>, config: MaintenanceConfig, every: Duration) -> Self {
        Self {
            maintenance,
            config,
            every,
        }
    }

    /// Run maintenance loop until shutdown; the first pass runs immediately
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.every.as_secs(),
            retention_days = self.config.finished_job_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.every);

        loop {
            tokio::select! {
                _ = tick.tick() => {},
                _ = shutdown.wait() => break,
            }

            match self.maintenance.run_full_maintenance(&self.config).await {
                Ok(stats) => {
                    info!(
                        db_size_mb = stats.db_size_mb,
                        job_count = stats.job_count,
                        finished_jobs = stats.finished_job_count,
                        "Scheduled maintenance completed successfully"
                    );
                }
                Err(e) => {
                    error!(error = ?e, "Scheduled maintenance failed");
                }
            }
        }
        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately (for manual trigger)
    pub async fn run_now(&self) -> Result<MaintenanceStats> {
        info!("Running manual maintenance...");
        self.maintenance.run_full_maintenance(&self.config).await
    }
}
