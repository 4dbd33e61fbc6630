//! Rankflow daemon - composition root
//!
//! Wires the SQLite store, the reqwest webhook client and the core services,
//! then runs the queue processor, the callback server, the JSON-RPC server
//! and the maintenance scheduler until Ctrl+C.

mod logging;
mod settings;

use anyhow::{anyhow, Context, Result};
use settings::DaemonSettings;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use rankflow_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use rankflow_core::application::{
    shutdown_channel, CallbackReconciler, Dispatcher, MaintenanceScheduler, QueueProcessor,
    RetryPolicy, StuckJobReaper,
};
use rankflow_core::port::id_provider::UuidProvider;
use rankflow_core::port::time_provider::SystemTimeProvider;
use rankflow_core::port::{JobEventSink, JobStore, MaintenanceConfig, TimeProvider, TracingEventSink};
use rankflow_infra_http::ReqwestWebhookClient;
use rankflow_infra_sqlite::{connect, SqliteJobStore, SqliteMaintenance};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if db_path.starts_with("sqlite:") {
        return Ok(());
    }
    let expanded = shellexpand::tilde(db_path).into_owned();
    if let Some(parent) = Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init();
    info!("Rankflow daemon v{} starting...", VERSION);

    let settings = DaemonSettings::load()?;
    let dispatch_config = settings.dispatch.clone();
    info!(
        endpoint = %dispatch_config.endpoint,
        signing = dispatch_config.signing_secret().is_some(),
        max_attempts = dispatch_config.max_attempts,
        batch_size = dispatch_config.batch_size,
        "Configuration loaded"
    );

    // Database
    ensure_db_dir(&settings.db_path)?;
    let db_url = settings.database_url();
    info!(db = %db_url, "Opening database...");
    let pool = connect(&db_url).await.context("Database setup failed")?;

    // Wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(pool.clone()));
    let events: Arc<dyn JobEventSink> = Arc::new(TracingEventSink);
    let client = Arc::new(ReqwestWebhookClient::new().context("HTTP client setup failed")?);
    let retry_policy = Arc::new(RetryPolicy::from_config(
        time_provider.clone(),
        &dispatch_config,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        client,
        retry_policy.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
        events.clone(),
        dispatch_config.clone(),
    ));
    let reconciler = Arc::new(CallbackReconciler::new(
        store.clone(),
        retry_policy.clone(),
        time_provider.clone(),
        events.clone(),
        &dispatch_config,
    ));
    let reaper = StuckJobReaper::new(
        store.clone(),
        retry_policy,
        time_provider.clone(),
        events,
        dispatch_config.processing_grace_ms,
    );
    let processor = QueueProcessor::new(store, dispatcher.clone(), reaper, time_provider.clone());

    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider));
    let maintenance_config = MaintenanceConfig {
        finished_job_retention_days: settings.retention_days,
        max_db_size_mb: settings.max_db_size_mb,
    };

    let (shutdown_tx, processor_shutdown) = shutdown_channel();

    // JSON-RPC server
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: settings.rpc_host.clone(),
            port: settings.rpc_port,
        },
        RpcHandler::new(
            dispatcher,
            maintenance.clone(),
            maintenance_config.clone(),
        ),
    );
    let (rpc_addr, rpc_handle) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow!("RPC server start failed: {}", e))?;

    // Callback server
    let callback_addr = settings.callback_socket_addr()?;
    let listener = TcpListener::bind(callback_addr)
        .await
        .with_context(|| format!("Failed to bind callback server on {}", callback_addr))?;
    let callback_handle = tokio::spawn(rankflow_api_callback::serve(
        listener,
        reconciler,
        shutdown_tx.token(),
    ));

    // Queue processor
    let tick_interval = settings.tick_interval();
    let processor_handle = tokio::spawn(async move {
        if let Err(e) = processor.run(processor_shutdown, tick_interval).await {
            error!(error = ?e, "Queue processor failed");
        }
    });

    // Retention sweep
    let scheduler = MaintenanceScheduler::new(
        maintenance,
        maintenance_config,
        settings.maintenance_interval(),
    );
    let maintenance_handle = tokio::spawn(scheduler.run(shutdown_tx.token()));

    info!(rpc = %rpc_addr, callback = %callback_addr, "System ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received. Exiting gracefully...");

    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }

    let drain = async {
        if let Ok(Err(e)) = callback_handle.await {
            error!(error = %e, "Callback server failed");
        }
        let _ = processor_handle.await;
        let _ = maintenance_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Tasks did not stop in time; in-flight jobs will be reaped after restart"
        );
    }

    pool.close().await;
    info!("Shutdown complete.");
    Ok(())
}
