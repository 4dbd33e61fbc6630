// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod job;

// Re-exports
pub use error::DomainError;
pub use event::JobEvent;
pub use job::{Job, JobId, JobOutcome, JobPayload, JobStatus, JobView, Priority, SubjectId};
