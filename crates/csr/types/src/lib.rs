//! Core types for CSR program checkpoint governance
//!
//! A sponsored program moves through five fixed checkpoints. Each checkpoint
//! is triggered by a platform admin and acknowledged by the user who owns the
//! program's sponsor. This crate holds the data model shared by the storage
//! layer, the checkpoint service and the daemon:
//!
//! - [`Program`] and its monotonic [`ProgramStatus`]
//! - [`Checkpoint`], [`CheckpointNumber`] and the fixed label contract
//! - [`Sponsor`] with its notification preferences
//! - [`Notification`] records produced by the dispatcher
//! - [`School`] and [`User`] records consumed by snapshots and admin fan-out

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod ids;
pub mod notification;
pub mod program;
pub mod school;
pub mod sponsor;
pub mod user;

pub use checkpoint::{
    Checkpoint, CheckpointNumber, CheckpointNumberError, CheckpointProgress, CheckpointStatus,
    CheckpointSummary, CheckpointType, CheckpointView, MetricsSnapshot, NotesUpdate,
    TriggerEligibility, TOTAL_CHECKPOINTS,
};
pub use ids::{NotificationId, ProgramId, SchoolId, SponsorId, UserId};
pub use notification::{
    Notification, NotificationAudience, NotificationPayload, NotificationStatus, RealtimeEvent,
    Severity,
};
pub use program::{NewProgram, Program, ProgramMetrics, ProgramStatus, ProgramSummary};
pub use school::School;
pub use sponsor::{Channel, Frequency, NotificationPreferences, Recipient, Sponsor};
pub use user::{Actor, Role, User};
