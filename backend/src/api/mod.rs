//! HTTP API module.
//!
//! This module provides the HTTP server, the response envelope and the
//! log sinks shared with the CLI.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
