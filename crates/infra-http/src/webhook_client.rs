// reqwest WebhookClient

use async_trait::async_trait;
use rankflow_core::error::{AppError, Result};
use rankflow_core::port::{DeliveryResult, WebhookClient};
use rankflow_core::signature::{self, SIGNATURE_HEADER};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP delivery to the automation endpoint
///
/// One POST per call; retries belong to the RetryPolicy.
#[derive(Clone)]
pub struct ReqwestWebhookClient {
    client: Client,
}

impl ReqwestWebhookClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rankflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Interpret a 2xx body: empty or JSON is accepted unless it says
/// `"accepted": false`; anything else is a rejection
fn interpret_success(status: StatusCode, text: String) -> DeliveryResult {
    let status = status.as_u16();
    if text.trim().is_empty() {
        return DeliveryResult::Accepted { status, body: None };
    }

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(body) if body.get("accepted") == Some(&serde_json::Value::Bool(false)) => {
            DeliveryResult::Rejected { status, body: text }
        }
        Ok(body) => DeliveryResult::Accepted {
            status,
            body: Some(body),
        },
        Err(_) => DeliveryResult::Rejected { status, body: text },
    }
}

fn network_error(err: &reqwest::Error, timeout: Duration) -> DeliveryResult {
    let message = if err.is_timeout() {
        format!("timed out after {}ms", timeout.as_millis())
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    DeliveryResult::NetworkError { message }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn send(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
        secret: Option<&str>,
        timeout: Duration,
    ) -> DeliveryResult {
        // Sign exactly the bytes that go on the wire
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryResult::NetworkError {
                    message: format!("failed to serialize payload: {}", e),
                }
            }
        };

        let mut request = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            let Some(sig) = signature::sign(secret, &body) else {
                return DeliveryResult::NetworkError {
                    message: "failed to sign payload".to_string(),
                };
            };
            request = request.header(SIGNATURE_HEADER, sig);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) => return network_error(&e, timeout),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return network_error(&e, timeout),
        };
        debug!(endpoint = %endpoint, status = status.as_u16(), "Webhook responded");

        if status.is_success() {
            interpret_success(status, text)
        } else {
            DeliveryResult::Rejected {
                status: status.as_u16(),
                body: text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    struct TestServer {
        base_url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    impl TestServer {
        async fn spawn() -> Self {
            let app = Router::new()
                .route("/ok", post(|| async { Json(json!({"accepted": true})) }))
                .route("/empty", post(|| async { AxumStatus::ACCEPTED }))
                .route("/refuse", post(|| async { Json(json!({"accepted": false})) }))
                .route("/html", post(|| async { "<html>ok</html>" }))
                .route(
                    "/fail",
                    post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "try later") }),
                )
                .route(
                    "/slow",
                    post(|| async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Json(json!({"accepted": true}))
                    }),
                )
                .route(
                    "/echo",
                    post(|headers: HeaderMap, body: Bytes| async move {
                        let signature = headers
                            .get(SIGNATURE_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        Json(json!({
                            "signature": signature,
                            "raw": String::from_utf8_lossy(&body),
                        }))
                    }),
                );

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self { base_url, handle }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn envelope() -> serde_json::Value {
        json!({
            "subjectId": "post-42",
            "payload": {"title": "x"},
            "metadata": {"jobId": "job-1", "attempt": 1, "timestamp": "2026-01-01T00:00:00.000Z"}
        })
    }

    #[tokio::test]
    async fn test_accepted_with_json_body() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let result = client.send(&server.url("/ok"), &envelope(), None, TIMEOUT).await;
        assert_eq!(
            result,
            DeliveryResult::Accepted {
                status: 200,
                body: Some(json!({"accepted": true}))
            }
        );
    }

    #[tokio::test]
    async fn test_accepted_with_empty_body() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let result = client.send(&server.url("/empty"), &envelope(), None, TIMEOUT).await;
        assert_eq!(
            result,
            DeliveryResult::Accepted {
                status: 202,
                body: None
            }
        );
    }

    #[tokio::test]
    async fn test_2xx_refusal_and_malformed_body_are_rejected() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let refused = client.send(&server.url("/refuse"), &envelope(), None, TIMEOUT).await;
        assert!(matches!(refused, DeliveryResult::Rejected { status: 200, .. }));

        let html = client.send(&server.url("/html"), &envelope(), None, TIMEOUT).await;
        assert_eq!(
            html,
            DeliveryResult::Rejected {
                status: 200,
                body: "<html>ok</html>".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected_with_body() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let result = client.send(&server.url("/fail"), &envelope(), None, TIMEOUT).await;
        assert_eq!(
            result,
            DeliveryResult::Rejected {
                status: 503,
                body: "try later".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let result = client
            .send(&server.url("/slow"), &envelope(), None, Duration::from_millis(50))
            .await;
        match result {
            DeliveryResult::NetworkError { message } => assert!(message.contains("timed out")),
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReqwestWebhookClient::new().unwrap();
        let result = client
            .send(&format!("http://{}/hook", addr), &envelope(), None, TIMEOUT)
            .await;
        assert_eq!(result.kind(), "network_error");
    }

    #[tokio::test]
    async fn test_signature_covers_raw_body() {
        let server = TestServer::spawn().await;
        let client = ReqwestWebhookClient::new().unwrap();

        let result = client
            .send(&server.url("/echo"), &envelope(), Some("s3cret"), TIMEOUT)
            .await;
        let body = match result {
            DeliveryResult::Accepted { body: Some(body), .. } => body,
            other => panic!("expected accepted, got {:?}", other),
        };

        let raw = body["raw"].as_str().unwrap();
        let sig = body["signature"].as_str().unwrap();
        assert!(signature::verify("s3cret", raw.as_bytes(), sig));
        assert_eq!(serde_json::from_str::<serde_json::Value>(raw).unwrap(), envelope());

        // No secret, no header
        let unsigned = client.send(&server.url("/echo"), &envelope(), None, TIMEOUT).await;
        match unsigned {
            DeliveryResult::Accepted { body: Some(body), .. } => assert!(body["signature"].is_null()),
            other => panic!("expected accepted, got {:?}", other),
        }
    }
}
