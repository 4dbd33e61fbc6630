// Application Layer - Use Cases and Business Logic

pub mod dispatcher;
pub mod maintenance;
pub mod queue_processor;
pub mod reconciler;
pub mod recovery;
pub mod retry;

// Re-exports
pub use dispatcher::{DispatchOutcome, Dispatcher, EnqueueRequest, QueueStats};
pub use maintenance::MaintenanceScheduler;
pub use queue_processor::{shutdown_channel, QueueProcessor, ShutdownSender, ShutdownToken, TickReport};
pub use reconciler::{CallbackOutcome, CallbackReconciler, ReconcileResult};
pub use recovery::{ReapReport, StuckJobReaper};
pub use retry::{RetryDecision, RetryPolicy};
