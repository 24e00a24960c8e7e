//! ODE daemon library
//!
//! This module provides the core components for the `oded` binary:
//! - Layered configuration
//! - Snapshot, status and health HTTP handlers
//! - The WebSocket live feed endpoint
//! - Server lifecycle management and one-shot commands

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
