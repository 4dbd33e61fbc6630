//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP, bound to localhost by default.

use crate::handler::RpcHandler;
use crate::types::{EnqueueParams, JobParams, MaintenanceParams, StatsParams};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("job.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueParams = params.parse()?;
                    handler.enqueue(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobParams = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.dispatch.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobParams = params.parse()?;
                    handler.dispatch(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsParams = params.parse().unwrap_or_default();
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.maintenance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: MaintenanceParams = params.parse().unwrap_or_default();
                    handler.maintenance(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the handle used to
    /// stop it.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnqueueResult, StatsResult};
    use async_trait::async_trait;
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::http_client::HttpClientBuilder;
    use jsonrpsee::rpc_params;
    use rankflow_core::application::{Dispatcher, RetryPolicy};
    use rankflow_core::error::Result as CoreResult;
    use rankflow_core::port::event_sink::mocks::RecordingEventSink;
    use rankflow_core::port::id_provider::SequentialIdProvider;
    use rankflow_core::port::time_provider::ManualTimeProvider;
    use rankflow_core::port::webhook_client::mocks::MockWebhookClient;
    use rankflow_core::port::{InMemoryJobStore, Maintenance, MaintenanceConfig, MaintenanceStats};
    use rankflow_core::DispatchConfig;
    use serde_json::json;

    struct NoopMaintenance;

    #[async_trait]
    impl Maintenance for NoopMaintenance {
        async fn vacuum(&self) -> CoreResult<f64> {
            Ok(0.0)
        }

        async fn gc_finished_jobs(&self, _retention_days: i64) -> CoreResult<i64> {
            Ok(0)
        }

        async fn get_stats(&self) -> CoreResult<MaintenanceStats> {
            Ok(MaintenanceStats {
                db_size_mb: 0.0,
                db_size_bytes: 4096,
                job_count: 0,
                finished_job_count: 0,
                fragmentation_percent: 0.0,
            })
        }
    }

    async fn start_server() -> (String, ServerHandle) {
        let clock = Arc::new(ManualTimeProvider::new(0));
        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(MockWebhookClient::new_accepting()),
            Arc::new(RetryPolicy::with_seed(clock.clone(), 1_000, 10_000, 1)),
            Arc::new(SequentialIdProvider::default()),
            clock,
            Arc::new(RecordingEventSink::new()),
            DispatchConfig::new("http://n8n.local/webhook/seo"),
        );
        let handler = RpcHandler::new(
            Arc::new(dispatcher),
            Arc::new(NoopMaintenance),
            MaintenanceConfig::default(),
        );
        let server = RpcServer::new(
            RpcServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            handler,
        );
        let (addr, handle) = server.start().await.unwrap();
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_enqueue_over_http() {
        let (url, handle) = start_server().await;
        let client = HttpClientBuilder::default().build(&url).unwrap();

        let res: EnqueueResult = client
            .request(
                "job.enqueue.v1",
                rpc_params![json!({
                    "subject_id": "post-7",
                    "payload": {"title": "x"},
                    "priority": "high"
                })],
            )
            .await
            .unwrap();
        assert_eq!(res.job_id, "job-1");

        let stats: StatsResult = client.request("admin.stats.v1", rpc_params![]).await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.db_size_bytes, 4096);

        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_error_code_over_http() {
        let (url, handle) = start_server().await;
        let client = HttpClientBuilder::default().build(&url).unwrap();

        let err = client
            .request::<serde_json::Value, _>(
                "job.status.v1",
                rpc_params![json!({"job_id": "missing"})],
            )
            .await
            .unwrap_err();
        match err {
            jsonrpsee::core::ClientError::Call(obj) => {
                assert_eq!(obj.code(), crate::error::code::NOT_FOUND)
            }
            other => panic!("expected call error, got {:?}", other),
        }

        handle.stop().unwrap();
    }
}
