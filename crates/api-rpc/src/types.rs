//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use rankflow_core::application::QueueStats;
use rankflow_core::domain::{JobStatus, Priority};
use serde::{Deserialize, Serialize};

/// job.enqueue.v1 - Enqueue an optimization job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueParams {
    pub subject_id: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub target_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResult {
    pub job_id: String,
    pub status: JobStatus,
}

/// job.status.v1 / job.dispatch.v1 - Address a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub job_id: String,
}

/// admin.stats.v1 - Queue and store statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResult {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub abandoned_jobs: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}

impl StatsResult {
    pub fn new(stats: &QueueStats, db_size_bytes: i64, uptime_seconds: i64) -> Self {
        Self {
            total_jobs: stats.total(),
            pending_jobs: stats.pending,
            processing_jobs: stats.processing,
            completed_jobs: stats.completed,
            failed_jobs: stats.failed,
            abandoned_jobs: stats.abandoned,
            db_size_bytes,
            uptime_seconds,
        }
    }
}

/// admin.maintenance.v1 - Run manual maintenance
#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceParams {
    #[serde(default)]
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResult {
    pub vacuum_run: bool,
    pub jobs_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
