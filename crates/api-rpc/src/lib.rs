//! JSON-RPC API Layer
//!
//! Admin and producer surface of the Rankflow dispatch queue: enqueue jobs,
//! query status, force a dispatch, read queue stats and run maintenance.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
