// SQLite Maintenance Implementation
use crate::map_sqlx_error;
use async_trait::async_trait;
use rankflow_core::error::Result;
use rankflow_core::port::{Maintenance, MaintenanceStats, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn pragma(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar(&format!("PRAGMA {}", name))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// DB size in bytes (page_count * page_size)
    async fn get_db_size_bytes(&self) -> Result<i64> {
        let page_count = self.pragma("page_count").await?;
        let page_size = self.pragma("page_size").await?;
        Ok(page_count * page_size)
    }
}

fn bytes_to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = bytes_to_mb(self.get_db_size_bytes().await?);

        // Run VACUUM (reclaims space and defragments)
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let size_after = bytes_to_mb(self.get_db_size_bytes().await?);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64> {
        let now = self.time_provider.now_millis();
        let cutoff_time = now.saturating_sub(retention_days.saturating_mul(MS_PER_DAY));

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Running finished job GC"
        );

        // Only terminal jobs; active jobs are never collected
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'abandoned')
            AND finished_at IS NOT NULL
            AND finished_at < ?
            "#,
        )
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected() as i64;

        info!(deleted_jobs = deleted, "Finished job GC completed");

        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size_bytes().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let finished_job_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('completed', 'abandoned')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // Share of pages on the freelist
        let page_count = self.pragma("page_count").await?;
        let freelist_count = self.pragma("freelist_count").await?;
        let fragmentation_percent = if page_count > 0 {
            (freelist_count as f64 / page_count as f64) * 100.0
        } else {
            0.0
        };

        Ok(MaintenanceStats {
            db_size_mb: bytes_to_mb(db_size_bytes),
            db_size_bytes,
            job_count,
            finished_job_count,
            fragmentation_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect, SqliteJobStore};
    use rankflow_core::domain::{Job, JobOutcome, JobPayload};
    use rankflow_core::port::time_provider::ManualTimeProvider;
    use rankflow_core::port::JobStore;
    use serde_json::json;

    const NOW: i64 = 100 * MS_PER_DAY;

    async fn setup() -> (SqliteJobStore, SqliteMaintenance) {
        let pool = connect("sqlite::memory:").await.unwrap();
        let time_provider = Arc::new(ManualTimeProvider::new(NOW));
        (
            SqliteJobStore::new(pool.clone()),
            SqliteMaintenance::new(pool, time_provider),
        )
    }

    async fn finished_job(store: &SqliteJobStore, id: &str, finished_at: i64) {
        let job = Job::new(id, 0, id, JobPayload::new(json!({"k": 1})), 3);
        store.insert(&job).await.unwrap();
        store.mark_processing(&job.id, 0).await.unwrap();
        store
            .mark_result(
                &job.id,
                1,
                &JobOutcome::Completed {
                    result: None,
                    current_score: None,
                },
                finished_at,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_maintenance_stats() {
        let (_, maintenance) = setup().await;
        let stats = maintenance.get_stats().await.unwrap();

        assert!(stats.db_size_mb > 0.0);
        assert_eq!(stats.job_count, 0);
        assert_eq!(stats.finished_job_count, 0);
    }

    #[tokio::test]
    async fn test_vacuum() {
        let (_, maintenance) = setup().await;

        // VACUUM should not error (even if no space is reclaimed in memory DB)
        let reclaimed = maintenance.vacuum().await.unwrap();
        assert!(reclaimed >= 0.0);
    }

    #[tokio::test]
    async fn test_gc_finished_jobs_respects_retention() {
        let (store, maintenance) = setup().await;

        finished_job(&store, "old", NOW - 10 * MS_PER_DAY).await;
        finished_job(&store, "recent", NOW - MS_PER_DAY).await;
        // Active jobs are never collected
        store
            .insert(&Job::new("active", 0, "active", JobPayload::new(json!({"k": 1})), 3))
            .await
            .unwrap();

        let deleted = maintenance.gc_finished_jobs(7).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get(&"old".to_string()).await.unwrap().is_none());
        assert!(store.get(&"recent".to_string()).await.unwrap().is_some());
        assert!(store.get(&"active".to_string()).await.unwrap().is_some());

        let stats = maintenance.get_stats().await.unwrap();
        assert_eq!(stats.job_count, 2);
        assert_eq!(stats.finished_job_count, 1);
    }
}
