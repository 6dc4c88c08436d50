//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csr_types::{
    Checkpoint, CheckpointNumber, CheckpointStatus, NotesUpdate, Notification, NotificationAudience,
    NotificationId, Program, ProgramId, ProgramMetrics, Role, School,
    SchoolId, Sponsor, SponsorId, User, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Programs and their checkpoints share one lock so that a completion can
/// update both atomically.
#[derive(Debug, Default)]
struct Ledger {
    programs: HashMap<ProgramId, Program>,
    /// Keyed by `(program_id, number)`; the key enforces uniqueness.
    checkpoints: BTreeMap<(ProgramId, CheckpointNumber), Checkpoint>,
}

/// In-memory storage for development and testing
#[derive(Debug)]
pub struct InMemoryStorage {
    ledger: Arc<RwLock<Ledger>>,
    sponsors: Arc<RwLock<HashMap<SponsorId, Sponsor>>>,
    schools: Arc<RwLock<HashMap<SchoolId, School>>>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::default())),
            sponsors: Arc::new(RwLock::new(HashMap::new())),
            schools: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
            notifications: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Insert a checkpoint row directly, bypassing the state machine.
    /// Rejects duplicate keys like [`ProgramStorage::create_program`].
    #[cfg(test)]
    pub(crate) async fn insert_checkpoint(&self, checkpoint: Checkpoint) -> StorageResult<()> {
        let mut ledger = self.ledger.write().await;
        let key = (checkpoint.program_id, checkpoint.number);
        if ledger.checkpoints.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "checkpoint {} already exists for program {}",
                checkpoint.number, checkpoint.program_id
            )));
        }
        ledger.checkpoints.insert(key, checkpoint);
        Ok(())
    }

    /// Overwrite a checkpoint's status, bypassing transition rules.
    #[cfg(test)]
    pub(crate) async fn force_checkpoint_status(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        status: CheckpointStatus,
    ) -> StorageResult<()> {
        let mut ledger = self.ledger.write().await;
        let checkpoint = ledger
            .checkpoints
            .get_mut(&(*program_id, number))
            .ok_or_else(|| StorageError::NotFound(format!("checkpoint {}", number)))?;
        checkpoint.status = status;
        Ok(())
    }
}

fn checkpoint_range(
    program_id: ProgramId,
) -> std::ops::RangeInclusive<(ProgramId, CheckpointNumber)> {
    let all = CheckpointNumber::all();
    (program_id, all[0])..=(program_id, all[all.len() - 1])
}

#[async_trait]
impl ProgramStorage for InMemoryStorage {
    async fn get_program(&self, id: &ProgramId) -> StorageResult<Option<Program>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.programs.get(id).cloned())
    }

    async fn list_programs(&self) -> StorageResult<Vec<Program>> {
        let ledger = self.ledger.read().await;
        let mut programs: Vec<_> = ledger.programs.values().cloned().collect();
        programs.sort_by_key(|p| p.created_at);
        Ok(programs)
    }

    async fn create_program(
        &self,
        program: Program,
        checkpoints: Vec<Checkpoint>,
    ) -> StorageResult<()> {
        let mut ledger = self.ledger.write().await;

        if ledger.programs.contains_key(&program.id) {
            return Err(StorageError::Conflict(format!(
                "program {} already exists",
                program.id
            )));
        }

        let mut keys = Vec::with_capacity(checkpoints.len());
        for checkpoint in &checkpoints {
            if checkpoint.program_id != program.id {
                return Err(StorageError::InvalidData(format!(
                    "checkpoint {} belongs to program {}, not {}",
                    checkpoint.number, checkpoint.program_id, program.id
                )));
            }
            let key = (checkpoint.program_id, checkpoint.number);
            if ledger.checkpoints.contains_key(&key) || keys.contains(&key) {
                return Err(StorageError::Conflict(format!(
                    "checkpoint {} already exists for program {}",
                    checkpoint.number, program.id
                )));
            }
            keys.push(key);
        }

        for (key, checkpoint) in keys.into_iter().zip(checkpoints) {
            ledger.checkpoints.insert(key, checkpoint);
        }
        ledger.programs.insert(program.id, program);
        Ok(())
    }

    async fn update_program_metrics(
        &self,
        id: &ProgramId,
        metrics: ProgramMetrics,
    ) -> StorageResult<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.programs.get_mut(id) {
            Some(program) => {
                program.metrics = Some(metrics);
                program.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryStorage {
    async fn get_checkpoint(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> StorageResult<Option<Checkpoint>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.checkpoints.get(&(*program_id, number)).cloned())
    }

    async fn list_checkpoints(&self, program_id: &ProgramId) -> StorageResult<Vec<Checkpoint>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .checkpoints
            .range(checkpoint_range(*program_id))
            .map(|(_, cp)| cp.clone())
            .collect())
    }

    async fn mark_ready(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: ReadyTransition,
    ) -> StorageResult<TransitionOutcome<Checkpoint>> {
        let mut ledger = self.ledger.write().await;
        let Some(checkpoint) = ledger.checkpoints.get_mut(&(*program_id, number)) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !checkpoint.status.can_transition_to(CheckpointStatus::Ready) {
            return Ok(TransitionOutcome::Conflict {
                current: checkpoint.status,
            });
        }

        checkpoint.status = CheckpointStatus::Ready;
        checkpoint.triggered_at = Some(transition.triggered_at);
        checkpoint.triggered_by = Some(transition.triggered_by);
        checkpoint.metrics_snapshot = Some(transition.metrics_snapshot);
        checkpoint.updated_at = transition.triggered_at;

        Ok(TransitionOutcome::Applied(checkpoint.clone()))
    }

    async fn mark_completed(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: CompletionTransition,
    ) -> StorageResult<TransitionOutcome<CompletedTransition>> {
        let mut guard = self.ledger.write().await;
        let ledger = &mut *guard;

        let Some(program) = ledger.programs.get_mut(program_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        let Some(checkpoint) = ledger.checkpoints.get_mut(&(*program_id, number)) else {
            return Ok(TransitionOutcome::NotFound);
        };

        if !checkpoint.status.can_transition_to(CheckpointStatus::Completed) {
            return Ok(TransitionOutcome::Conflict {
                current: checkpoint.status,
            });
        }

        checkpoint.status = CheckpointStatus::Completed;
        checkpoint.acknowledged_at = Some(transition.completed_at);
        checkpoint.acknowledged_by = Some(transition.acknowledged_by);
        checkpoint.completed_at = Some(transition.completed_at);
        checkpoint.updated_at = transition.completed_at;

        if let Some(target) = transition.advance_program_to {
            program.advance_status(target);
        }

        Ok(TransitionOutcome::Applied(CompletedTransition {
            checkpoint: checkpoint.clone(),
            program: program.clone(),
        }))
    }

    async fn update_notes(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        update: &NotesUpdate,
    ) -> StorageResult<Option<Checkpoint>> {
        let mut ledger = self.ledger.write().await;
        let Some(checkpoint) = ledger.checkpoints.get_mut(&(*program_id, number)) else {
            return Ok(None);
        };

        if let Some(admin_notes) = &update.admin_notes {
            checkpoint.admin_notes = Some(admin_notes.clone());
        }
        if let Some(notes) = &update.notes {
            checkpoint.notes = Some(notes.clone());
        }
        checkpoint.updated_at = Utc::now();

        Ok(Some(checkpoint.clone()))
    }
}

#[async_trait]
impl SponsorStorage for InMemoryStorage {
    async fn get_sponsor(&self, id: &SponsorId) -> StorageResult<Option<Sponsor>> {
        let sponsors = self.sponsors.read().await;
        Ok(sponsors.get(id).cloned())
    }

    async fn upsert_sponsor(&self, sponsor: Sponsor) -> StorageResult<()> {
        let mut sponsors = self.sponsors.write().await;
        sponsors.insert(sponsor.id, sponsor);
        Ok(())
    }
}

#[async_trait]
impl SchoolStorage for InMemoryStorage {
    async fn list_schools_for_program(&self, program_id: &ProgramId) -> StorageResult<Vec<School>> {
        let schools = self.schools.read().await;
        Ok(schools
            .values()
            .filter(|s| s.program_id.as_ref() == Some(program_id))
            .cloned()
            .collect())
    }

    async fn upsert_school(&self, school: School) -> StorageResult<()> {
        let mut schools = self.schools.write().await;
        schools.insert(school.id, school);
        Ok(())
    }
}

#[async_trait]
impl UserStorage for InMemoryStorage {
    async fn list_users_by_role(&self, role: Role) -> StorageResult<Vec<User>> {
        let users = self.users.read().await;
        let mut matching: Vec<_> = users.values().filter(|u| u.role == role).cloned().collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn upsert_user(&self, user: User) -> StorageResult<()> {
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl NotificationStorage for InMemoryStorage {
    async fn insert_notification(&self, notification: Notification) -> StorageResult<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.iter().any(|n| n.id == notification.id) {
            return Err(StorageError::Conflict(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        notifications.push(notification);
        Ok(())
    }

    async fn get_notification(&self, id: &NotificationId) -> StorageResult<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.iter().find(|n| &n.id == id).cloned())
    }

    async fn update_notification(&self, notification: Notification) -> StorageResult<bool> {
        let mut notifications = self.notifications.write().await;
        match notifications.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => {
                *existing = notification;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.is_due(now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_notifications_for_sponsor(
        &self,
        sponsor_id: &SponsorId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| {
                matches!(&n.audience, NotificationAudience::Sponsor { sponsor_id: s } if s == sponsor_id)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_notifications_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| {
                matches!(&n.audience, NotificationAudience::Admin { user_id: u } if u == user_id)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

impl Storage for InMemoryStorage {}
