// Rankflow Infrastructure - SQLite Adapter
// Implements: JobStore, Maintenance

mod connection;
mod job_store;
mod maintenance_impl;
mod migration;

pub use connection::{connect, create_pool};
pub use job_store::SqliteJobStore;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::{run_migrations, SCHEMA_VERSION};

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
pub(crate) use job_store::map_sqlx_error;
