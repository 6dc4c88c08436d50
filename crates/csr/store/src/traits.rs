//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csr_types::{
    Checkpoint, CheckpointNumber, CheckpointStatus, MetricsSnapshot, NotesUpdate, Notification,
    NotificationId, Program, ProgramId, ProgramMetrics, ProgramStatus, Role, School, Sponsor,
    SponsorId, User, UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined storage trait
#[async_trait]
pub trait Storage:
    ProgramStorage
    + CheckpointStorage
    + SponsorStorage
    + SchoolStorage
    + UserStorage
    + NotificationStorage
    + Send
    + Sync
{
}

/// Result of a compare-and-swap status transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome<T> {
    /// The expected status matched and the write was applied
    Applied(T),
    /// The checkpoint was not in the expected status
    Conflict { current: CheckpointStatus },
    /// No such checkpoint
    NotFound,
}

/// Fields recorded when a checkpoint moves `pending -> ready`
#[derive(Debug, Clone)]
pub struct ReadyTransition {
    pub triggered_by: UserId,
    pub triggered_at: DateTime<Utc>,
    pub metrics_snapshot: MetricsSnapshot,
}

/// Fields recorded when a checkpoint moves `ready -> completed`
#[derive(Debug, Clone)]
pub struct CompletionTransition {
    pub acknowledged_by: UserId,
    pub completed_at: DateTime<Utc>,
    /// Program status to advance to, if the checkpoint maps to one.
    /// Never lowers the current status.
    pub advance_program_to: Option<ProgramStatus>,
}

/// Checkpoint and owning program after a completed transition
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransition {
    pub checkpoint: Checkpoint,
    pub program: Program,
}

/// Storage for programs
#[async_trait]
pub trait ProgramStorage: Send + Sync {
    /// Get a program by ID
    async fn get_program(&self, id: &ProgramId) -> StorageResult<Option<Program>>;

    /// List all programs
    async fn list_programs(&self) -> StorageResult<Vec<Program>>;

    /// Create a program together with its checkpoint rows in one unit of work.
    ///
    /// Fails with [`StorageError::Conflict`] if the program or any
    /// `(program_id, number)` pair already exists.
    async fn create_program(
        &self,
        program: Program,
        checkpoints: Vec<Checkpoint>,
    ) -> StorageResult<()>;

    /// Replace the aggregate metrics cache of a program
    async fn update_program_metrics(
        &self,
        id: &ProgramId,
        metrics: ProgramMetrics,
    ) -> StorageResult<bool>;
}

/// Storage for checkpoints
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Get a single checkpoint
    async fn get_checkpoint(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> StorageResult<Option<Checkpoint>>;

    /// List the checkpoints of a program ordered by number
    async fn list_checkpoints(&self, program_id: &ProgramId) -> StorageResult<Vec<Checkpoint>>;

    /// Set status to `ready` where status is `pending`
    async fn mark_ready(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: ReadyTransition,
    ) -> StorageResult<TransitionOutcome<Checkpoint>>;

    /// Set status to `completed` where status is `ready`, advancing the
    /// program status in the same unit of work
    async fn mark_completed(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: CompletionTransition,
    ) -> StorageResult<TransitionOutcome<CompletedTransition>>;

    /// Apply a notes update without touching status or lifecycle timestamps
    async fn update_notes(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        update: &NotesUpdate,
    ) -> StorageResult<Option<Checkpoint>>;
}

/// Storage for sponsors
#[async_trait]
pub trait SponsorStorage: Send + Sync {
    /// Get a sponsor by ID
    async fn get_sponsor(&self, id: &SponsorId) -> StorageResult<Option<Sponsor>>;

    /// Create or update a sponsor
    async fn upsert_sponsor(&self, sponsor: Sponsor) -> StorageResult<()>;
}

/// Storage for schools
#[async_trait]
pub trait SchoolStorage: Send + Sync {
    /// List schools assigned to a program
    async fn list_schools_for_program(&self, program_id: &ProgramId) -> StorageResult<Vec<School>>;

    /// Create or update a school
    async fn upsert_school(&self, school: School) -> StorageResult<()>;
}

/// Storage for user accounts
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// List users holding a role
    async fn list_users_by_role(&self, role: Role) -> StorageResult<Vec<User>>;

    /// Create or update a user
    async fn upsert_user(&self, user: User) -> StorageResult<()>;
}

/// Storage for notification records
#[async_trait]
pub trait NotificationStorage: Send + Sync {
    /// Persist a new notification record
    async fn insert_notification(&self, notification: Notification) -> StorageResult<()>;

    /// Get a notification by ID
    async fn get_notification(&self, id: &NotificationId) -> StorageResult<Option<Notification>>;

    /// Replace the delivery state of an existing record
    async fn update_notification(&self, notification: Notification) -> StorageResult<bool>;

    /// Pending records whose retry time has passed at `now`, oldest first.
    ///
    /// Records still backing off are excluded before `limit` applies, so they
    /// never hide due records created after them.
    async fn list_due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Notification>>;

    /// Most recent sponsor-scoped records first
    async fn list_notifications_for_sponsor(
        &self,
        sponsor_id: &SponsorId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>>;

    /// Most recent admin-scoped records for a user first
    async fn list_notifications_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>>;
}
