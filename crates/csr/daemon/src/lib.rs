//! CSR checkpoint daemon library
//!
//! This module provides the components of the `csrd` binary:
//! - REST API handlers and the realtime event stream
//! - Delivery gateways (realtime hub, email relay)
//! - Configuration and server lifecycle management

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use delivery::{DaemonGateway, EmailSender, HttpEmailRelay, LogEmailSender, RealtimeHub};
pub use error::{ApiError, DaemonError};
pub use server::Server;
