//! Application state for API handlers

use crate::delivery::RealtimeHub;
use csr_checkpoints::{CheckpointService, Directory};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkpoint state machine
    pub service: Arc<CheckpointService>,

    /// Sponsor and user registry
    pub directory: Arc<Directory>,

    /// Realtime event hub
    pub hub: RealtimeHub,

    /// Storage backend name, reported by the health endpoint
    pub storage_backend: &'static str,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        service: Arc<CheckpointService>,
        directory: Arc<Directory>,
        hub: RealtimeHub,
        storage_backend: &'static str,
    ) -> Self {
        Self {
            service,
            directory,
            hub,
            storage_backend,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
