//! Checkpoint state machine
//!
//! The only component that moves checkpoints between states. Every status
//! write goes through the storage compare-and-swap entry points, so a lost
//! race surfaces as [`CheckpointError::InvalidTransition`] rather than a
//! double transition. Notifications are sent after the transition has
//! committed and their failures are logged, never returned.

use crate::error::{CheckpointError, CheckpointResult};
use crate::notify::NotificationDispatcher;
use crate::snapshot::MetricsSnapshotProvider;
use chrono::Utc;
use csr_store::{CompletionTransition, ReadyTransition, Storage, TransitionOutcome};
use csr_types::{
    Actor, Checkpoint, CheckpointNumber, CheckpointProgress, CheckpointStatus, CheckpointSummary,
    CheckpointView, NewProgram, NotesUpdate, NotificationPayload, Program, ProgramId,
    ProgramStatus, ProgramSummary, Severity, Sponsor, TriggerEligibility, TOTAL_CHECKPOINTS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a successful acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeOutcome {
    pub checkpoint: CheckpointSummary,
    pub program: ProgramSummary,
}

/// Why a checkpoint cannot be triggered
#[derive(Debug, Clone, PartialEq, Eq)]
enum TriggerDenial {
    Missing(String),
    Blocked(String),
}

impl TriggerDenial {
    fn reason(&self) -> &str {
        match self {
            TriggerDenial::Missing(r) | TriggerDenial::Blocked(r) => r,
        }
    }

    fn into_error(self) -> CheckpointError {
        match self {
            TriggerDenial::Missing(r) => CheckpointError::NotFound(r),
            TriggerDenial::Blocked(r) => CheckpointError::InvalidTransition(r),
        }
    }
}

fn conflict_reason(current: CheckpointStatus) -> String {
    match current {
        CheckpointStatus::Pending => "Checkpoint is not ready for acknowledgment".to_string(),
        other => format!("Checkpoint is already {}", other),
    }
}

/// Checkpoint operations for admins and sponsors
pub struct CheckpointService {
    storage: Arc<dyn Storage>,
    snapshots: MetricsSnapshotProvider,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CheckpointService {
    pub fn new(storage: Arc<dyn Storage>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            snapshots: MetricsSnapshotProvider::new(storage.clone()),
            storage,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Create a `draft` program with its five `pending` checkpoints
    pub async fn provision_program(
        &self,
        request: NewProgram,
        actor: &Actor,
    ) -> CheckpointResult<Program> {
        if !actor.is_admin() {
            return Err(CheckpointError::Forbidden(
                "Only administrators can create programs".to_string(),
            ));
        }
        if request.name.trim().is_empty() {
            return Err(CheckpointError::Validation(
                "Program name must not be empty".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (request.start_date, request.end_date) {
            if end < start {
                return Err(CheckpointError::Validation(
                    "Program end date must not precede its start date".to_string(),
                ));
            }
        }
        if self.storage.get_sponsor(&request.sponsor_id).await?.is_none() {
            return Err(CheckpointError::NotFound("Sponsor not found".to_string()));
        }

        let program = Program::from_request(request);
        let checkpoints = Checkpoint::initial_set(program.id);
        self.storage
            .create_program(program.clone(), checkpoints)
            .await?;

        tracing::info!(
            program_id = %program.id,
            sponsor_id = %program.sponsor_id,
            created_by = %actor.user_id,
            "Program provisioned"
        );
        Ok(program)
    }

    /// All programs, oldest first
    pub async fn programs(&self) -> CheckpointResult<Vec<Program>> {
        Ok(self.storage.list_programs().await?)
    }

    /// All checkpoints of a program in order, with display labels
    pub async fn list(&self, program_id: &ProgramId) -> CheckpointResult<Vec<CheckpointView>> {
        self.require_program(program_id).await?;
        let checkpoints = self.storage.list_checkpoints(program_id).await?;
        Ok(checkpoints.iter().map(Checkpoint::view).collect())
    }

    /// Whether checkpoint `number` may be triggered now.
    ///
    /// Never fails; storage errors are reported as a denial reason.
    pub async fn can_trigger(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> TriggerEligibility {
        match self.evaluate_trigger(program_id, number).await {
            Ok(Ok(_)) => TriggerEligibility::allowed(),
            Ok(Err(denial)) => TriggerEligibility::denied(denial.reason()),
            Err(e) => {
                tracing::warn!(
                    program_id = %program_id,
                    checkpoint = %number,
                    error = %e,
                    "Trigger eligibility check failed"
                );
                TriggerEligibility::denied(format!("Unable to evaluate checkpoint: {}", e))
            }
        }
    }

    /// Move a checkpoint from `pending` to `ready` and notify the sponsor.
    ///
    /// The caller must be an administrator; anyone else gets `Forbidden`
    /// before any program or checkpoint state is read.
    pub async fn trigger(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        actor: &Actor,
    ) -> CheckpointResult<CheckpointView> {
        if !actor.is_admin() {
            return Err(CheckpointError::Forbidden(
                "Only administrators can trigger checkpoints".to_string(),
            ));
        }

        let program = self
            .evaluate_trigger(program_id, number)
            .await?
            .map_err(TriggerDenial::into_error)?;

        let snapshot = self.snapshots.capture(program_id).await?;
        let transition = ReadyTransition {
            triggered_by: actor.user_id.clone(),
            triggered_at: Utc::now(),
            metrics_snapshot: snapshot,
        };

        let checkpoint = match self.storage.mark_ready(program_id, number, transition).await? {
            TransitionOutcome::Applied(checkpoint) => checkpoint,
            TransitionOutcome::Conflict { current } => {
                return Err(CheckpointError::InvalidTransition(conflict_reason(current)))
            }
            TransitionOutcome::NotFound => {
                return Err(CheckpointError::NotFound("Checkpoint not found".to_string()))
            }
        };

        tracing::info!(
            program_id = %program_id,
            checkpoint = %number,
            triggered_by = %actor.user_id,
            "Checkpoint triggered"
        );

        self.notify_sponsor(&program, &checkpoint).await;
        Ok(checkpoint.view())
    }

    /// Move a checkpoint from `ready` to `completed` on behalf of the
    /// sponsor, advancing the program status, and notify admins
    pub async fn acknowledge(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        actor: &Actor,
    ) -> CheckpointResult<AcknowledgeOutcome> {
        let program = self.require_program(program_id).await?;
        let sponsor = self
            .storage
            .get_sponsor(&program.sponsor_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Sponsor not found".to_string()))?;

        if sponsor.user_id != actor.user_id {
            return Err(CheckpointError::Forbidden(
                "Only the program sponsor can acknowledge checkpoints".to_string(),
            ));
        }

        let checkpoint = self
            .storage
            .get_checkpoint(program_id, number)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Checkpoint not found".to_string()))?;
        if checkpoint.status != CheckpointStatus::Ready {
            return Err(CheckpointError::InvalidTransition(conflict_reason(
                checkpoint.status,
            )));
        }

        let transition = CompletionTransition {
            acknowledged_by: actor.user_id.clone(),
            completed_at: Utc::now(),
            advance_program_to: ProgramStatus::after_checkpoint(number),
        };

        let completed = match self
            .storage
            .mark_completed(program_id, number, transition)
            .await?
        {
            TransitionOutcome::Applied(completed) => completed,
            TransitionOutcome::Conflict { current } => {
                return Err(CheckpointError::InvalidTransition(conflict_reason(current)))
            }
            TransitionOutcome::NotFound => {
                return Err(CheckpointError::NotFound("Checkpoint not found".to_string()))
            }
        };

        tracing::info!(
            program_id = %program_id,
            checkpoint = %number,
            acknowledged_by = %actor.user_id,
            program_status = %completed.program.status,
            "Checkpoint acknowledged"
        );

        self.notify_admins(&sponsor, &completed.program, &completed.checkpoint)
            .await;

        Ok(AcknowledgeOutcome {
            checkpoint: completed.checkpoint.summary(),
            program: completed.program.summary(),
        })
    }

    /// Progress of a program through its checkpoints.
    ///
    /// While a checkpoint is `ready`, no next checkpoint is reported: the
    /// following one cannot be triggered until the current one completes.
    pub async fn status(&self, program_id: &ProgramId) -> CheckpointResult<CheckpointProgress> {
        self.require_program(program_id).await?;
        let checkpoints = self.storage.list_checkpoints(program_id).await?;

        let current = checkpoints
            .iter()
            .find(|c| c.status == CheckpointStatus::Ready);
        let next = match current {
            Some(_) => None,
            None => checkpoints
                .iter()
                .find(|c| c.status == CheckpointStatus::Pending),
        };
        let completed = checkpoints
            .iter()
            .filter(|c| c.status == CheckpointStatus::Completed)
            .count();

        Ok(CheckpointProgress {
            current_checkpoint: current.map(Checkpoint::summary),
            next_checkpoint: next.map(Checkpoint::summary),
            completed_checkpoints: completed,
            total_checkpoints: TOTAL_CHECKPOINTS,
            checkpoints: checkpoints.iter().map(Checkpoint::summary).collect(),
        })
    }

    /// Update free-text notes in any state; status is never touched
    pub async fn update_notes(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        update: NotesUpdate,
        actor: &Actor,
    ) -> CheckpointResult<CheckpointView> {
        if !actor.is_admin() {
            return Err(CheckpointError::Forbidden(
                "Only administrators can update checkpoint notes".to_string(),
            ));
        }
        if update.is_empty() {
            return Err(CheckpointError::Validation(
                "At least one of admin_notes or notes is required".to_string(),
            ));
        }

        let checkpoint = self
            .storage
            .update_notes(program_id, number, &update)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Checkpoint not found".to_string()))?;

        tracing::debug!(program_id = %program_id, checkpoint = %number, "Checkpoint notes updated");
        Ok(checkpoint.view())
    }

    async fn require_program(&self, program_id: &ProgramId) -> CheckpointResult<Program> {
        self.storage
            .get_program(program_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Program not found".to_string()))
    }

    async fn evaluate_trigger(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> CheckpointResult<Result<Program, TriggerDenial>> {
        let Some(program) = self.storage.get_program(program_id).await? else {
            return Ok(Err(TriggerDenial::Missing("Program not found".to_string())));
        };
        let Some(checkpoint) = self.storage.get_checkpoint(program_id, number).await? else {
            return Ok(Err(TriggerDenial::Missing("Checkpoint not found".to_string())));
        };
        if checkpoint.status != CheckpointStatus::Pending {
            return Ok(Err(TriggerDenial::Blocked(conflict_reason(checkpoint.status))));
        }

        if let Some(previous) = number.previous() {
            let done = self
                .storage
                .get_checkpoint(program_id, previous)
                .await?
                .is_some_and(|c| c.status == CheckpointStatus::Completed);
            if !done {
                return Ok(Err(TriggerDenial::Blocked(format!(
                    "Checkpoint {} must be completed first",
                    previous
                ))));
            }
        }

        Ok(Ok(program))
    }

    async fn notify_sponsor(&self, program: &Program, checkpoint: &Checkpoint) {
        let sponsor = match self.storage.get_sponsor(&program.sponsor_id).await {
            Ok(Some(sponsor)) => sponsor,
            Ok(None) => {
                tracing::warn!(
                    program_id = %program.id,
                    sponsor_id = %program.sponsor_id,
                    "Sponsor missing, checkpoint notification not sent"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    program_id = %program.id,
                    error = %e,
                    "Failed to load sponsor for checkpoint notification"
                );
                return;
            }
        };

        let payload = NotificationPayload {
            kind: "checkpoint_ready".to_string(),
            category: "program".to_string(),
            title: format!(
                "Checkpoint {}: {} is ready for your review",
                checkpoint.number,
                checkpoint.label()
            ),
            message: format!(
                "{} has reached the {} checkpoint. Please review the program metrics and acknowledge.",
                program.name,
                checkpoint.label()
            ),
            link: Some(format!(
                "/sponsor/programs/{}/checkpoints/{}",
                program.id, checkpoint.number
            )),
            severity: Severity::Info,
            metadata: serde_json::json!({
                "program_id": program.id,
                "checkpoint_number": checkpoint.number,
                "checkpoint_type": checkpoint.checkpoint_type,
            }),
        };

        self.dispatcher.dispatch_to_sponsor(&sponsor, payload).await;
    }

    async fn notify_admins(&self, sponsor: &Sponsor, program: &Program, checkpoint: &Checkpoint) {
        let payload = NotificationPayload {
            kind: "checkpoint_acknowledged".to_string(),
            category: "program".to_string(),
            title: format!(
                "{} acknowledged checkpoint {}: {}",
                sponsor.organization_name,
                checkpoint.number,
                checkpoint.label()
            ),
            message: format!(
                "{} is now {}.",
                program.name,
                program.status.as_str().replace('_', " ")
            ),
            link: Some(format!("/admin/programs/{}/checkpoints", program.id)),
            severity: Severity::Success,
            metadata: serde_json::json!({
                "program_id": program.id,
                "sponsor_id": sponsor.id,
                "checkpoint_number": checkpoint.number,
                "program_status": program.status,
            }),
        };

        self.dispatcher.notify_admins(payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_reasons() {
        assert_eq!(
            conflict_reason(CheckpointStatus::Ready),
            "Checkpoint is already ready"
        );
        assert_eq!(
            conflict_reason(CheckpointStatus::Completed),
            "Checkpoint is already completed"
        );
        assert_eq!(
            conflict_reason(CheckpointStatus::Pending),
            "Checkpoint is not ready for acknowledgment"
        );
    }

    #[test]
    fn test_denial_maps_to_error_kind() {
        use crate::error::ErrorKind;

        let missing = TriggerDenial::Missing("Program not found".into());
        assert_eq!(missing.reason(), "Program not found");
        assert_eq!(missing.into_error().kind(), ErrorKind::NotFound);

        let blocked = TriggerDenial::Blocked("Checkpoint 1 must be completed first".into());
        assert_eq!(blocked.into_error().kind(), ErrorKind::InvalidTransition);
    }
}
