//! Storage layer for CSR checkpoint governance
//!
//! Provides persistent storage for programs, checkpoints, sponsors, schools,
//! users and notification records. Checkpoint status changes go through two
//! compare-and-swap entry points ([`CheckpointStorage::mark_ready`] and
//! [`CheckpointStorage::mark_completed`]); no other write path touches
//! checkpoint or program status.

#![deny(unsafe_code)]

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{
    CheckpointStorage, CompletedTransition, CompletionTransition, NotificationStorage,
    ProgramStorage, ReadyTransition, SchoolStorage, SponsorStorage, Storage, StorageResult,
    TransitionOutcome, UserStorage,
};
