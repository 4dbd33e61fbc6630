// Enqueue Use Case

use crate::config::{DispatchConfig, DuplicatePolicy};
use crate::domain::{Job, JobId, JobPayload, Priority};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum subject id length (characters)
pub const MAX_SUBJECT_ID_LEN: usize = 255;

/// Maximum JSON nesting depth accepted in payloads
pub const MAX_PAYLOAD_DEPTH: usize = 32;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub subject_id: String,
    pub payload: serde_json::Value,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub target_score: Option<f64>,
}

impl EnqueueRequest {
    pub fn new(subject_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            subject_id: subject_id.into(),
            payload,
            priority: Priority::Normal,
            target_score: None,
        }
    }
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Validate an enqueue request; failures are `InvalidPayload`
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    let subject = req.subject_id.trim();
    if subject.is_empty() {
        return Err(AppError::InvalidPayload(
            "subject_id cannot be empty".to_string(),
        ));
    }
    if subject.chars().count() > MAX_SUBJECT_ID_LEN {
        return Err(AppError::InvalidPayload(format!(
            "subject_id too long (max {} characters)",
            MAX_SUBJECT_ID_LEN
        )));
    }

    let empty = match &req.payload {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return Err(AppError::InvalidPayload("payload cannot be empty".to_string()));
    }
    if json_depth(&req.payload) > MAX_PAYLOAD_DEPTH {
        return Err(AppError::InvalidPayload(format!(
            "payload too deeply nested (max depth {})",
            MAX_PAYLOAD_DEPTH
        )));
    }

    if let Some(score) = req.target_score {
        if !score.is_finite() {
            return Err(AppError::InvalidPayload(
                "target_score must be a finite number".to_string(),
            ));
        }
    }
    Ok(())
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `store` - Job store
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `config` - Dispatch configuration (attempt ceiling, duplicate policy)
/// * `req` - Enqueue request
pub async fn execute(
    store: &dyn JobStore,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    config: &DispatchConfig,
    req: EnqueueRequest,
) -> Result<JobId> {
    validate_request(&req)?;

    let subject_id = req.subject_id.trim().to_string();
    let mut job = Job::new(
        id_provider.generate_id(),
        time_provider.now_millis(),
        subject_id.clone(),
        JobPayload::new(req.payload),
        config.max_attempts,
    );
    job.priority = req.priority;
    job.target_score = req.target_score;

    match store.insert(&job).await {
        Ok(job_id) => {
            info!(
                job_id = %job_id,
                subject_id = %subject_id,
                priority = %job.priority,
                "Job enqueued"
            );
            Ok(job_id)
        }
        Err(AppError::DuplicateSubject(subject)) if config.duplicate_policy == DuplicatePolicy::Reuse => {
            // The active job may have finished between insert and lookup
            match store.find_active_by_subject(&subject).await? {
                Some(existing) => {
                    info!(
                        job_id = %existing.id,
                        subject_id = %subject,
                        "Reusing active job for subject"
                    );
                    Ok(existing.id)
                }
                None => store.insert(&job).await,
            }
        }
        Err(e) => Err(e),
    }
}
