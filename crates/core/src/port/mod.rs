// Port Layer - Interfaces for external dependencies

pub mod event_sink;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod maintenance;
pub mod time_provider;
pub mod webhook_client;

// Re-exports
pub use event_sink::{JobEventSink, TracingEventSink};
pub use id_provider::IdProvider;
pub use job_store::{InMemoryJobStore, JobStore};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use time_provider::TimeProvider;
pub use webhook_client::{DeliveryResult, WebhookClient};
