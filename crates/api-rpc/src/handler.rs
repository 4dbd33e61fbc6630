//! RPC Method Handlers
//!
//! Thin translation from RPC types to the core use cases.

use crate::error::to_rpc_error;
use crate::types::{
    EnqueueParams, EnqueueResult, JobParams, MaintenanceParams, MaintenanceResult, StatsParams,
    StatsResult,
};
use jsonrpsee::types::ErrorObjectOwned;
use rankflow_core::application::{DispatchOutcome, Dispatcher, EnqueueRequest};
use rankflow_core::domain::JobView;
use rankflow_core::port::{Maintenance, MaintenanceConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Fragmentation above which a manual maintenance run vacuums anyway
const VACUUM_FRAGMENTATION_PERCENT: f64 = 10.0;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    dispatcher: Arc<Dispatcher>,
    maintenance: Arc<dyn Maintenance>,
    maintenance_config: MaintenanceConfig,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        maintenance: Arc<dyn Maintenance>,
        maintenance_config: MaintenanceConfig,
    ) -> Self {
        Self {
            dispatcher,
            maintenance,
            maintenance_config,
            start_time: Instant::now(),
        }
    }

    /// job.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueParams) -> Result<EnqueueResult, ErrorObjectOwned> {
        let req = EnqueueRequest {
            subject_id: params.subject_id,
            payload: params.payload,
            priority: params.priority,
            target_score: params.target_score,
        };

        let job_id = self.dispatcher.enqueue(req).await.map_err(to_rpc_error)?;

        // With the reuse policy the id may belong to a job already in flight
        let status = self
            .dispatcher
            .get_status(&job_id)
            .await
            .map_err(to_rpc_error)?
            .status;

        Ok(EnqueueResult { job_id, status })
    }

    /// job.status.v1
    pub async fn status(&self, params: JobParams) -> Result<JobView, ErrorObjectOwned> {
        self.dispatcher
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// job.dispatch.v1
    ///
    /// Forces one delivery attempt now. The claim rules still apply, so a
    /// job inside its backoff window comes back as `skipped`.
    pub async fn dispatch(&self, params: JobParams) -> Result<DispatchOutcome, ErrorObjectOwned> {
        // Surface unknown ids as NotFound rather than a silent skip
        self.dispatcher
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        let outcome = self
            .dispatcher
            .dispatch(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        info!(job_id = %params.job_id, outcome = ?outcome, "Manual dispatch");
        Ok(outcome)
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsParams) -> Result<StatsResult, ErrorObjectOwned> {
        let queue = self.dispatcher.stats().await.map_err(to_rpc_error)?;
        let store = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResult::new(
            &queue,
            store.db_size_bytes,
            self.start_time.elapsed().as_secs() as i64,
        ))
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceParams,
    ) -> Result<MaintenanceResult, ErrorObjectOwned> {
        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        let jobs_deleted = self
            .maintenance
            .gc_finished_jobs(self.maintenance_config.finished_job_retention_days)
            .await
            .map_err(to_rpc_error)?;

        let vacuum_run = params.force_vacuum
            || stats_before.fragmentation_percent > VACUUM_FRAGMENTATION_PERCENT
            || stats_before.db_size_mb > self.maintenance_config.max_db_size_mb;
        if vacuum_run {
            self.maintenance.vacuum().await.map_err(to_rpc_error)?;
        }

        let stats_after = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(MaintenanceResult {
            vacuum_run,
            jobs_deleted,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: stats_after.db_size_bytes,
        })
    }
}
