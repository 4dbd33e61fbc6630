// Webhook Client Port
// Outbound delivery to the external automation endpoint

use async_trait::async_trait;
use std::time::Duration;

/// Synchronous result of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryResult {
    /// 2xx; the endpoint took the job (usually "received", not "done")
    Accepted {
        status: u16,
        body: Option<serde_json::Value>,
    },
    /// Non-2xx, or a 2xx with a body that cannot be interpreted
    Rejected { status: u16, body: String },
    /// Connect failure, timeout, or broken response stream
    NetworkError { message: String },
}

impl DeliveryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryResult::Accepted { .. } => "accepted",
            DeliveryResult::Rejected { .. } => "rejected",
            DeliveryResult::NetworkError { .. } => "network_error",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, DeliveryResult::Accepted { .. })
    }

    /// Failure reason recorded as `last_error`
    pub fn error_message(&self) -> Option<String> {
        const MAX_BODY_CHARS: usize = 200;
        match self {
            DeliveryResult::Accepted { .. } => None,
            DeliveryResult::Rejected { status, body } => {
                let body: String = body.chars().take(MAX_BODY_CHARS).collect();
                Some(format!("rejected: HTTP {} {}", status, body).trim_end().to_string())
            }
            DeliveryResult::NetworkError { message } => Some(format!("network_error: {}", message)),
        }
    }
}

/// Webhook client interface.
///
/// Implementations never retry internally; retry is the RetryPolicy's job.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// POST `payload` as JSON to `endpoint`, signing the raw body when a
    /// secret is given. Every failure mode maps to a `DeliveryResult`.
    async fn send(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
        secret: Option<&str>,
        timeout: Duration,
    ) -> DeliveryResult;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A request seen by the mock
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub endpoint: String,
        pub payload: serde_json::Value,
        pub secret: Option<String>,
        pub timeout: Duration,
    }

    /// Mock Webhook Client: replays scripted results, then a fallback
    pub struct MockWebhookClient {
        script: Arc<Mutex<VecDeque<DeliveryResult>>>,
        fallback: DeliveryResult,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
        delay: Option<Duration>,
    }

    impl MockWebhookClient {
        pub fn new(fallback: DeliveryResult) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                fallback,
                requests: Arc::new(Mutex::new(Vec::new())),
                delay: None,
            }
        }

        pub fn new_accepting() -> Self {
            Self::new(DeliveryResult::Accepted {
                status: 200,
                body: Some(serde_json::json!({"accepted": true})),
            })
        }

        pub fn new_network_error(message: impl Into<String>) -> Self {
            Self::new(DeliveryResult::NetworkError {
                message: message.into(),
            })
        }

        pub fn new_rejecting(status: u16) -> Self {
            Self::new(DeliveryResult::Rejected {
                status,
                body: String::new(),
            })
        }

        /// Queue results returned before the fallback
        pub fn with_script(self, results: Vec<DeliveryResult>) -> Self {
            *self.script.lock().unwrap() = results.into();
            self
        }

        /// Sleep before answering (to widen race windows in tests)
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookClient for MockWebhookClient {
        async fn send(
            &self,
            endpoint: &str,
            payload: &serde_json::Value,
            secret: Option<&str>,
            timeout: Duration,
        ) -> DeliveryResult {
            self.requests.lock().unwrap().push(RecordedRequest {
                endpoint: endpoint.to_string(),
                payload: payload.clone(),
                secret: secret.map(str::to_string),
                timeout,
            });

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let accepted = DeliveryResult::Accepted {
            status: 202,
            body: None,
        };
        assert_eq!(accepted.kind(), "accepted");
        assert!(accepted.error_message().is_none());

        let rejected = DeliveryResult::Rejected {
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(rejected.kind(), "rejected");
        assert_eq!(rejected.error_message().unwrap(), "rejected: HTTP 500 oops");

        let network = DeliveryResult::NetworkError {
            message: "timed out".into(),
        };
        assert_eq!(network.kind(), "network_error");
        assert!(network.error_message().unwrap().contains("timed out"));
    }
}
