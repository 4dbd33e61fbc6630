// SQLite JobStore Implementation

use async_trait::async_trait;
use rankflow_core::domain::{Job, JobId, JobOutcome, JobPayload, JobStatus, Priority};
use rankflow_core::error::{AppError, Result};
use rankflow_core::port::JobStore;
use sqlx::SqlitePool;

/// SQLite extended result code for a UNIQUE index violation
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// SQLite extended result code for a PRIMARY KEY violation
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
                        AppError::Database(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

/// True when `err` came from the partial unique index on active subjects
fn is_active_subject_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE)
                && db_err.message().contains("subject_id")
        }
        _ => false,
    }
}

/// `status IN ('processing', ...)` for the statuses an outcome may apply from
fn source_clause(outcome: &JobOutcome) -> String {
    let sources = JobStatus::sources_for(outcome.target_status())
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("status IN ({})", sources)
}

const ACTIVE_CLAUSE: &str = "status IN ('pending', 'processing', 'failed')";

/// Durable JobStore
///
/// Every state change is a single conditional UPDATE, so several
/// processes may share one database file.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<JobId> {
        let result_json = job.result.as_ref().map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, subject_id, payload, status, priority,
                attempts, max_attempts, next_attempt_at,
                created_at, updated_at, dispatched_at, finished_at,
                last_error, current_score, target_score, result
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.subject_id)
        .bind(job.payload.as_value().to_string())
        .bind(job.status.as_str())
        .bind(job.priority.rank())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.next_attempt_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.dispatched_at)
        .bind(job.finished_at)
        .bind(&job.last_error)
        .bind(job.current_score)
        .bind(job.target_score)
        .bind(result_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_active_subject_violation(&e) {
                AppError::DuplicateSubject(job.subject_id.clone())
            } else {
                map_sqlx_error(e)
            }
        })?;

        Ok(job.id.clone())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list_due(&self, now: i64, limit: usize) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending'
               OR (status = 'failed' AND attempts < max_attempts AND next_attempt_at <= ?)
            ORDER BY priority DESC, created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn mark_processing(&self, id: &JobId, now: i64) -> Result<bool> {
        // Compare-and-set: the WHERE clause is the claim condition
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = 'processing',
                attempts = attempts + 1,
                dispatched_at = ?,
                updated_at = ?
            WHERE id = ?
              AND attempts < max_attempts
              AND (status = 'pending' OR (status = 'failed' AND next_attempt_at <= ?))
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(claimed.is_some())
    }

    async fn mark_result(
        &self,
        id: &JobId,
        attempt: i32,
        outcome: &JobOutcome,
        now: i64,
    ) -> Result<bool> {
        let guard = source_clause(outcome);

        let result = match outcome {
            JobOutcome::Accepted => {
                sqlx::query(&format!(
                    "UPDATE jobs SET last_error = NULL, updated_at = ? WHERE id = ? AND attempts = ? AND {}",
                    guard
                ))
                .bind(now)
                .bind(id)
                .bind(attempt)
                .execute(&self.pool)
                .await
            }
            JobOutcome::Completed {
                result,
                current_score,
            } => {
                sqlx::query(&format!(
                    r#"
                    UPDATE jobs
                    SET status = 'completed',
                        result = ?,
                        current_score = COALESCE(?, current_score),
                        last_error = NULL,
                        finished_at = ?,
                        updated_at = ?
                    WHERE id = ? AND attempts = ? AND {}
                    "#,
                    guard
                ))
                .bind(result.as_ref().map(|v| v.to_string()))
                .bind(*current_score)
                .bind(now)
                .bind(now)
                .bind(id)
                .bind(attempt)
                .execute(&self.pool)
                .await
            }
            JobOutcome::RetryScheduled {
                error,
                next_attempt_at,
            } => {
                sqlx::query(&format!(
                    r#"
                    UPDATE jobs
                    SET status = 'failed',
                        last_error = ?,
                        next_attempt_at = MAX(?, ?),
                        updated_at = ?
                    WHERE id = ? AND attempts = ? AND {}
                    "#,
                    guard
                ))
                .bind(error)
                .bind(*next_attempt_at)
                .bind(now)
                .bind(now)
                .bind(id)
                .bind(attempt)
                .execute(&self.pool)
                .await
            }
            JobOutcome::Abandoned { error } => {
                sqlx::query(&format!(
                    r#"
                    UPDATE jobs
                    SET status = 'abandoned',
                        last_error = ?,
                        finished_at = ?,
                        updated_at = ?
                    WHERE id = ? AND attempts = ? AND {}
                    "#,
                    guard
                ))
                .bind(error)
                .bind(now)
                .bind(now)
                .bind(id)
                .bind(attempt)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_stuck(&self, cutoff: i64, limit: usize) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status = 'processing' AND dispatched_at < ?
            ORDER BY dispatched_at ASC
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn find_active_by_subject(&self, subject_id: &str) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT * FROM jobs WHERE subject_id = ? AND {} LIMIT 1",
            ACTIVE_CLAUSE
        ))
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    subject_id: String,
    payload: String,
    status: String,
    priority: i32,
    attempts: i32,
    max_attempts: i32,
    next_attempt_at: i64,
    created_at: i64,
    updated_at: i64,
    dispatched_at: Option<i64>,
    finished_at: Option<i64>,
    last_error: Option<String>,
    current_score: Option<f64>,
    target_score: Option<f64>,
    result: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|e| AppError::Database(format!("job {}: {}", self.id, e)))?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;

        Ok(Job {
            id: self.id,
            subject_id: self.subject_id,
            payload: JobPayload::new(payload),
            status,
            priority: Priority::from_rank(self.priority),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            next_attempt_at: self.next_attempt_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            dispatched_at: self.dispatched_at,
            finished_at: self.finished_at,
            last_error: self.last_error,
            current_score: self.current_score,
            target_score: self.target_score,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup_test_store() -> SqliteJobStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn job(id: &str, subject: &str, created_at: i64) -> Job {
        Job::new(id, created_at, subject, JobPayload::new(json!({"title": "x"})), 3)
    }

    fn completed() -> JobOutcome {
        JobOutcome::Completed {
            result: Some(json!({"score": 95})),
            current_score: Some(95.0),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let store = setup_test_store().await;
        let mut original = job("job-1", "post-42", 1_000);
        original.priority = Priority::High;
        original.target_score = Some(90.0);

        store.insert(&original).await.unwrap();
        let found = store.get(&original.id).await.unwrap().unwrap();

        assert_eq!(found.subject_id, "post-42");
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.priority, Priority::High);
        assert_eq!(found.attempts, 0);
        assert_eq!(found.next_attempt_at, 1_000);
        assert_eq!(found.target_score, Some(90.0));
        assert_eq!(found.payload.as_value(), &json!({"title": "x"}));
        assert!(store.get(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_active_subject() {
        let store = setup_test_store().await;
        store.insert(&job("a", "post-1", 1_000)).await.unwrap();

        let err = store.insert(&job("b", "post-1", 2_000)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateSubject(ref s) if s == "post-1"));

        // Same id is a plain constraint error, not a duplicate subject
        let err = store.insert(&job("a", "post-2", 2_000)).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let active = store.find_active_by_subject("post-1").await.unwrap().unwrap();
        assert_eq!(active.id, "a");

        store.mark_processing(&"a".to_string(), 3_000).await.unwrap();
        store.mark_result(&"a".to_string(), 1, &completed(), 4_000).await.unwrap();
        assert!(store.find_active_by_subject("post-1").await.unwrap().is_none());
        store.insert(&job("c", "post-1", 5_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_due_ordering() {
        let store = setup_test_store().await;
        let mut low = job("low", "s1", 1_000);
        low.priority = Priority::Low;
        let mut high = job("high", "s2", 3_000);
        high.priority = Priority::High;

        store.insert(&low).await.unwrap();
        store.insert(&high).await.unwrap();
        // Same created_at: insertion order breaks the tie
        store.insert(&job("zz-first", "s3", 2_000)).await.unwrap();
        store.insert(&job("aa-second", "s4", 2_000)).await.unwrap();

        let ids: Vec<String> = store
            .list_due(10_000, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec!["high", "zz-first", "aa-second", "low"]);
        assert_eq!(store.list_due(10_000, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_increments_attempts_and_respects_gate() {
        let store = setup_test_store().await;
        let id = store.insert(&job("a", "s1", 1_000)).await.unwrap();

        assert!(store.mark_processing(&id, 2_000).await.unwrap());
        assert!(!store.mark_processing(&id, 2_000).await.unwrap());

        let claimed = store.get(&id).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.dispatched_at, Some(2_000));

        let retry = JobOutcome::RetryScheduled {
            error: "HTTP 503".into(),
            next_attempt_at: 9_000,
        };
        assert!(store.mark_result(&id, 1, &retry, 3_000).await.unwrap());
        assert!(store.list_due(8_999, 10).await.unwrap().is_empty());
        assert!(!store.mark_processing(&id, 8_999).await.unwrap());
        assert!(store.mark_processing(&id, 9_000).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_job_never_claimed() {
        let store = setup_test_store().await;
        let mut one_shot = job("a", "s1", 1_000);
        one_shot.max_attempts = 1;
        let id = store.insert(&one_shot).await.unwrap();

        assert!(store.mark_processing(&id, 1_000).await.unwrap());
        let retry = JobOutcome::RetryScheduled {
            error: "x".into(),
            next_attempt_at: 1_000,
        };
        store.mark_result(&id, 1, &retry, 1_500).await.unwrap();

        assert!(store.list_due(i64::MAX, 10).await.unwrap().is_empty());
        assert!(!store.mark_processing(&id, i64::MAX).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(setup_test_store().await);
        let id = store.insert(&job("a", "s1", 1_000)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.mark_processing(&id, 2_000).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_mark_result_terminal_is_noop() {
        let store = setup_test_store().await;
        let id = store.insert(&job("a", "s1", 1_000)).await.unwrap();
        store.mark_processing(&id, 1_000).await.unwrap();

        assert!(store.mark_result(&id, 1, &completed(), 2_000).await.unwrap());
        assert!(!store.mark_result(&id, 1, &completed(), 3_000).await.unwrap());
        assert!(!store
            .mark_result(&id, 1, &JobOutcome::Abandoned { error: "late".into() }, 3_000)
            .await
            .unwrap());
        assert!(!store.mark_processing(&id, 3_000).await.unwrap());

        let done = store.get(&id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.updated_at, 2_000);
        assert_eq!(done.finished_at, Some(2_000));
        assert_eq!(done.current_score, Some(95.0));
        assert_eq!(done.result, Some(json!({"score": 95})));
    }

    #[tokio::test]
    async fn test_accepted_requires_processing() {
        let store = setup_test_store().await;
        let id = store.insert(&job("a", "s1", 1_000)).await.unwrap();
        assert!(!store.mark_result(&id, 0, &JobOutcome::Accepted, 1_500).await.unwrap());

        store.mark_processing(&id, 2_000).await.unwrap();
        assert!(store.mark_result(&id, 1, &JobOutcome::Accepted, 2_500).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_mark_result_guards_attempt() {
        let store = setup_test_store().await;
        let mut two_shot = job("a", "s1", 1_000);
        two_shot.max_attempts = 2;
        let id = store.insert(&two_shot).await.unwrap();

        store.mark_processing(&id, 1_000).await.unwrap();
        let timeout = JobOutcome::RetryScheduled {
            error: "callback timeout".into(),
            next_attempt_at: 2_000,
        };
        assert!(store.mark_result(&id, 1, &timeout, 1_500).await.unwrap());
        assert!(store.mark_processing(&id, 2_000).await.unwrap());

        // A retry computed for attempt 1 must not land on the final attempt
        let stale = JobOutcome::RetryScheduled {
            error: "late failure".into(),
            next_attempt_at: 5_000,
        };
        assert!(!store.mark_result(&id, 1, &stale, 2_500).await.unwrap());
        let current = store.get(&id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Processing);
        assert_eq!(current.attempts, 2);

        let abandon = JobOutcome::Abandoned {
            error: "late failure".into(),
        };
        assert!(store.mark_result(&id, 2, &abandon, 2_500).await.unwrap());
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            JobStatus::Abandoned
        );
    }

    #[tokio::test]
    async fn test_find_stuck_count_and_remove() {
        let store = setup_test_store().await;
        store.insert(&job("a", "s1", 1_000)).await.unwrap();
        store.insert(&job("b", "s2", 1_000)).await.unwrap();
        store.mark_processing(&"a".to_string(), 1_000).await.unwrap();
        store.mark_processing(&"b".to_string(), 5_000).await.unwrap();

        let stuck = store.find_stuck(2_000, 10).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, "a");

        assert_eq!(store.count_by_status(JobStatus::Processing).await.unwrap(), 2);
        assert!(store.remove(&"a".to_string()).await.unwrap());
        assert!(!store.remove(&"a".to_string()).await.unwrap());
        assert_eq!(store.count_by_status(JobStatus::Processing).await.unwrap(), 1);
    }
}
