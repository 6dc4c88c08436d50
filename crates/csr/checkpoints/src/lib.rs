//! CSR program checkpoint governance
//!
//! Programs pass through five fixed checkpoints. Each one is triggered by a
//! platform administrator, which freezes a metrics snapshot and notifies the
//! sponsor, and is then acknowledged by the sponsoring organization, which
//! advances the program status and notifies the administrators.
//!
//! ```text
//! admin ── trigger ──▶ pending → ready ──▶ sponsor notified
//! sponsor ─ acknowledge ─▶ ready → completed (+ program status) ──▶ admins notified
//! ```

#![deny(unsafe_code)]

pub mod directory;
pub mod error;
pub mod notify;
pub mod service;
pub mod snapshot;

pub use directory::Directory;
pub use error::{CheckpointError, CheckpointResult, ErrorKind};
pub use notify::{
    DeliveryError, DeliveryGateway, DeliveryMode, DeliveryWorker, NotificationDispatcher,
    RetryPolicy, WorkerConfig,
};
pub use service::{AcknowledgeOutcome, CheckpointService};
pub use snapshot::MetricsSnapshotProvider;
