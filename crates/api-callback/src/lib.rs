//! Callback API
//!
//! `POST /callback/:job_id` receives the asynchronous result of a dispatched
//! job and hands the raw body to the `CallbackReconciler`.

pub mod errors;
pub mod routes;
pub mod server;

pub use routes::router;
pub use server::serve;
