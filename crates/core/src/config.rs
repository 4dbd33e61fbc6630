// Dispatch configuration (explicit, passed into each component)

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default webhook request timeout (30s)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default dispatch attempt ceiling
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default retry base delay (5s)
pub const DEFAULT_BASE_DELAY_MS: u64 = 5_000;

/// Default backoff ceiling (5 minutes)
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 5 * 60 * 1000;

/// Default callback grace window before a processing job counts as stuck (10 minutes)
pub const DEFAULT_PROCESSING_GRACE_MS: u64 = 10 * 60 * 1000;

/// Default jobs dispatched per tick
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// What enqueue does when the subject already has an active job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateSubject`
    #[default]
    Reject,
    /// Return the id of the existing active job
    Reuse,
}

/// Typed dispatch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Automation webhook URL
    pub endpoint: String,
    /// HMAC secret shared with the automation service (signing is off when absent)
    pub secret: Option<String>,
    /// Public base URL of the callback endpoint, advertised in webhook metadata
    pub callback_base_url: Option<String>,
    pub timeout_ms: u64,
    pub max_attempts: i32,
    pub base_delay_ms: u64,
    pub backoff_cap_ms: u64,
    pub processing_grace_ms: u64,
    pub batch_size: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            secret: None,
            callback_base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            processing_grace_ms: DEFAULT_PROCESSING_GRACE_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_policy: DuplicatePolicy::Reject,
        }
    }
}

impl DispatchConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Secret with empty strings treated as "not configured"
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Callback URL the automation service should POST the result to
    pub fn callback_url(&self, job_id: &str) -> Option<String> {
        self.callback_base_url
            .as_deref()
            .filter(|base| !base.is_empty())
            .map(|base| format!("{}/callback/{}", base.trim_end_matches('/'), job_id))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject configurations that must stop startup
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(AppError::Config("endpoint must be set".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "endpoint must be an http(s) URL, got {}",
                self.endpoint
            )));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::Config("timeout_ms must be > 0".to_string()));
        }
        if self.max_attempts < 1 {
            return Err(AppError::Config("max_attempts must be >= 1".to_string()));
        }
        if self.base_delay_ms == 0 {
            return Err(AppError::Config("base_delay_ms must be > 0".to_string()));
        }
        if self.backoff_cap_ms < self.base_delay_ms {
            return Err(AppError::Config(
                "backoff_cap_ms must be >= base_delay_ms".to_string(),
            ));
        }
        // The reaper must never time out a send that is still in flight
        if self.processing_grace_ms <= self.timeout_ms {
            return Err(AppError::Config(format!(
                "processing_grace_ms ({}) must be greater than timeout_ms ({})",
                self.processing_grace_ms, self.timeout_ms
            )));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be > 0".to_string()));
        }
        Ok(())
    }
}
