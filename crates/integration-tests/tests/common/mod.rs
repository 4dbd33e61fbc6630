//! Shared wiring for the integration tests

#![allow(dead_code)]

use rankflow_core::application::{
    CallbackReconciler, Dispatcher, QueueProcessor, RetryPolicy, StuckJobReaper,
};
use rankflow_core::port::event_sink::mocks::RecordingEventSink;
use rankflow_core::port::id_provider::SequentialIdProvider;
use rankflow_core::port::time_provider::ManualTimeProvider;
use rankflow_core::port::{IdProvider, WebhookClient};
use rankflow_core::DispatchConfig;
use rankflow_infra_sqlite::{connect, SqliteJobStore};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

pub const T0: i64 = 1_700_000_000_000;
pub const SECRET: &str = "integration-secret";
pub const ENDPOINT: &str = "http://n8n.local/webhook/seo";

pub fn config() -> DispatchConfig {
    let mut config = DispatchConfig::new(ENDPOINT).with_secret(SECRET);
    config.base_delay_ms = 1_000;
    config.backoff_cap_ms = 10_000;
    config.processing_grace_ms = 60_000;
    config
}

/// Every component wired against one SQLite store
pub struct Stack {
    pub store: Arc<SqliteJobStore>,
    pub clock: Arc<ManualTimeProvider>,
    pub events: Arc<RecordingEventSink>,
    pub dispatcher: Arc<Dispatcher>,
    pub reconciler: Arc<CallbackReconciler>,
    pub processor: QueueProcessor,
}

impl Stack {
    pub fn new(
        pool: SqlitePool,
        client: Arc<dyn WebhookClient>,
        clock: Arc<ManualTimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        config: DispatchConfig,
    ) -> Self {
        let store = Arc::new(SqliteJobStore::new(pool));
        let events = Arc::new(RecordingEventSink::new());
        let retry_policy = Arc::new(RetryPolicy::with_seed(
            clock.clone(),
            config.base_delay_ms,
            config.backoff_cap_ms,
            42,
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            client,
            retry_policy.clone(),
            id_provider,
            clock.clone(),
            events.clone(),
            config.clone(),
        ));
        let reconciler = Arc::new(CallbackReconciler::new(
            store.clone(),
            retry_policy.clone(),
            clock.clone(),
            events.clone(),
            &config,
        ));
        let reaper = StuckJobReaper::new(
            store.clone(),
            retry_policy,
            clock.clone(),
            events.clone(),
            config.processing_grace_ms,
        );
        let processor = QueueProcessor::new(store.clone(), dispatcher.clone(), reaper, clock.clone());

        Self {
            store,
            clock,
            events,
            dispatcher,
            reconciler,
            processor,
        }
    }

    /// In-memory store with a manual clock at `T0`
    pub async fn in_memory(client: Arc<dyn WebhookClient>, config: DispatchConfig) -> Self {
        let pool = connect("sqlite::memory:").await.unwrap();
        Self::new(
            pool,
            client,
            Arc::new(ManualTimeProvider::new(T0)),
            Arc::new(SequentialIdProvider::default()),
            config,
        )
    }
}

/// A file-backed database that is removed on drop
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("rankflow-it-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}
