// Domain events emitted on job lifecycle milestones

use crate::domain::{JobId, SubjectId};
use serde::Serialize;

/// Follow-up signal for collaborators outside the core
/// (e.g. applying the optimized content once a job completes)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Completed {
        job_id: JobId,
        subject_id: SubjectId,
        result: Option<serde_json::Value>,
        current_score: Option<f64>,
        target_score: Option<f64>,
    },
    Abandoned {
        job_id: JobId,
        subject_id: SubjectId,
        attempts: i32,
        last_error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Completed { job_id, .. } | JobEvent::Abandoned { job_id, .. } => job_id,
        }
    }

    /// Whether a completed job reached its goal metric (None when no goal is set)
    pub fn target_reached(&self) -> Option<bool> {
        match self {
            JobEvent::Completed {
                current_score: Some(current),
                target_score: Some(target),
                ..
            } => Some(current >= target),
            _ => None,
        }
    }
}
