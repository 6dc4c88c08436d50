//! Checkpoints: the five governance gates of a program
//!
//! Checkpoint numbers, their semantic types and their display labels are a
//! fixed contract relied on by reporting and UI consumers:
//!
//! | # | Type | Label |
//! |---|------|-------|
//! | 1 | `program_approval` | Program Approval |
//! | 2 | `onboarding_confirmation` | Onboarding Confirmation |
//! | 3 | `mid_program_review` | Mid-Program Review |
//! | 4 | `completion_review` | Completion Review |
//! | 5 | `extension_renewal` | Extension/Renewal |
//!
//! A checkpoint only ever moves `pending -> ready -> completed`.

use crate::ids::{ProgramId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of checkpoints every program carries
pub const TOTAL_CHECKPOINTS: usize = 5;

/// Rejected checkpoint number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointNumberError {
    #[error("checkpoint number must be numeric, got '{0}'")]
    NotNumeric(String),

    #[error("checkpoint number must be between 1 and 5, got {0}")]
    OutOfRange(i64),
}

/// A validated checkpoint number in `1..=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct CheckpointNumber(u8);

impl CheckpointNumber {
    pub fn new(n: u8) -> Result<Self, CheckpointNumberError> {
        Self::try_from(n as i64)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// All checkpoint numbers in order
    pub fn all() -> [CheckpointNumber; TOTAL_CHECKPOINTS] {
        [Self(1), Self(2), Self(3), Self(4), Self(5)]
    }

    /// The checkpoint that must be completed before this one can be triggered
    pub fn previous(&self) -> Option<CheckpointNumber> {
        (self.0 > 1).then(|| Self(self.0 - 1))
    }

    pub fn checkpoint_type(&self) -> CheckpointType {
        match self.0 {
            1 => CheckpointType::ProgramApproval,
            2 => CheckpointType::OnboardingConfirmation,
            3 => CheckpointType::MidProgramReview,
            4 => CheckpointType::CompletionReview,
            _ => CheckpointType::ExtensionRenewal,
        }
    }

    pub fn label(&self) -> &'static str {
        self.checkpoint_type().label()
    }
}

impl TryFrom<i64> for CheckpointNumber {
    type Error = CheckpointNumberError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        if (1..=TOTAL_CHECKPOINTS as i64).contains(&n) {
            Ok(Self(n as u8))
        } else {
            Err(CheckpointNumberError::OutOfRange(n))
        }
    }
}

impl From<CheckpointNumber> for u8 {
    fn from(n: CheckpointNumber) -> Self {
        n.0
    }
}

impl FromStr for CheckpointNumber {
    type Err = CheckpointNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: i64 = s
            .trim()
            .parse()
            .map_err(|_| CheckpointNumberError::NotNumeric(s.to_string()))?;
        Self::try_from(n)
    }
}

impl fmt::Display for CheckpointNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic type of a checkpoint, fixed per number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    ProgramApproval,
    OnboardingConfirmation,
    MidProgramReview,
    CompletionReview,
    ExtensionRenewal,
}

impl CheckpointType {
    pub fn label(&self) -> &'static str {
        match self {
            CheckpointType::ProgramApproval => "Program Approval",
            CheckpointType::OnboardingConfirmation => "Onboarding Confirmation",
            CheckpointType::MidProgramReview => "Mid-Program Review",
            CheckpointType::CompletionReview => "Completion Review",
            CheckpointType::ExtensionRenewal => "Extension/Renewal",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointType::ProgramApproval => "program_approval",
            CheckpointType::OnboardingConfirmation => "onboarding_confirmation",
            CheckpointType::MidProgramReview => "mid_program_review",
            CheckpointType::CompletionReview => "completion_review",
            CheckpointType::ExtensionRenewal => "extension_renewal",
        }
    }
}

/// Checkpoint state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Created with the program, waiting for an admin trigger
    Pending,
    /// Triggered by an admin, waiting for sponsor acknowledgment
    Ready,
    /// Acknowledged by the sponsor (terminal)
    Completed,
}

impl CheckpointStatus {
    /// Only single forward steps are legal.
    pub fn can_transition_to(&self, next: CheckpointStatus) -> bool {
        matches!(
            (self, next),
            (CheckpointStatus::Pending, CheckpointStatus::Ready)
                | (CheckpointStatus::Ready, CheckpointStatus::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Ready => "ready",
            CheckpointStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program metrics frozen when a checkpoint is triggered.
///
/// Never recomputed afterwards, so it may legitimately diverge from live
/// dashboard figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub students_onboarded: u64,
    pub active_students: u64,
    pub participation_rate: f64,
    pub completion_rate: f64,
    pub schools_implemented: u64,
    pub captured_at: DateTime<Utc>,
}

/// One governance gate of a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub program_id: ProgramId,
    pub number: CheckpointNumber,
    pub checkpoint_type: CheckpointType,
    pub status: CheckpointStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub triggered_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<UserId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics_snapshot: Option<MetricsSnapshot>,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh `pending` checkpoint
    pub fn pending(program_id: ProgramId, number: CheckpointNumber) -> Self {
        let now = Utc::now();
        Self {
            program_id,
            number,
            checkpoint_type: number.checkpoint_type(),
            status: CheckpointStatus::Pending,
            triggered_at: None,
            triggered_by: None,
            acknowledged_at: None,
            acknowledged_by: None,
            completed_at: None,
            metrics_snapshot: None,
            notes: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The full set of five pending checkpoints for a new program
    pub fn initial_set(program_id: ProgramId) -> Vec<Checkpoint> {
        CheckpointNumber::all()
            .into_iter()
            .map(|n| Checkpoint::pending(program_id, n))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        self.number.label()
    }

    pub fn view(&self) -> CheckpointView {
        CheckpointView {
            label: self.label().to_string(),
            can_acknowledge: self.status == CheckpointStatus::Ready,
            is_complete: self.status == CheckpointStatus::Completed,
            checkpoint: self.clone(),
        }
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            number: self.number,
            checkpoint_type: self.checkpoint_type,
            label: self.label().to_string(),
            status: self.status,
            triggered_at: self.triggered_at,
            acknowledged_at: self.acknowledged_at,
            completed_at: self.completed_at,
        }
    }
}

/// A checkpoint annotated for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointView {
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub label: String,
    pub can_acknowledge: bool,
    pub is_complete: bool,
}

/// Compact per-checkpoint summary used in progress reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub number: CheckpointNumber,
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    pub label: String,
    pub status: CheckpointStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Whether a checkpoint may be triggered right now, and why not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEligibility {
    pub can_trigger: bool,
    pub reason: Option<String>,
}

impl TriggerEligibility {
    pub fn allowed() -> Self {
        Self {
            can_trigger: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_trigger: false,
            reason: Some(reason.into()),
        }
    }
}

/// Checkpoint progress of a single program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointProgress {
    pub current_checkpoint: Option<CheckpointSummary>,
    pub next_checkpoint: Option<CheckpointSummary>,
    pub completed_checkpoints: usize,
    pub total_checkpoints: usize,
    pub checkpoints: Vec<CheckpointSummary>,
}

/// Free-text annotation update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesUpdate {
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NotesUpdate {
    pub fn is_empty(&self) -> bool {
        self.admin_notes.is_none() && self.notes.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_fixed() {
        let labels: Vec<_> = CheckpointNumber::all().iter().map(|n| n.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Program Approval",
                "Onboarding Confirmation",
                "Mid-Program Review",
                "Completion Review",
                "Extension/Renewal",
            ]
        );
    }

    #[test]
    fn test_number_validation() {
        assert!(CheckpointNumber::new(0).is_err());
        assert!(CheckpointNumber::new(6).is_err());
        assert_eq!(CheckpointNumber::new(3).unwrap().get(), 3);
        assert_eq!(
            "abc".parse::<CheckpointNumber>(),
            Err(CheckpointNumberError::NotNumeric("abc".into()))
        );
        assert_eq!(
            "9".parse::<CheckpointNumber>(),
            Err(CheckpointNumberError::OutOfRange(9))
        );
        assert_eq!("2".parse::<CheckpointNumber>().unwrap().get(), 2);
    }

    #[test]
    fn test_number_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<CheckpointNumber>("7").is_err());
        let n: CheckpointNumber = serde_json::from_str("4").unwrap();
        assert_eq!(serde_json::to_string(&n).unwrap(), "4");
    }

    #[test]
    fn test_previous() {
        assert_eq!(CheckpointNumber::new(1).unwrap().previous(), None);
        assert_eq!(
            CheckpointNumber::new(3).unwrap().previous(),
            Some(CheckpointNumber::new(2).unwrap())
        );
    }

    #[test]
    fn test_status_only_moves_forward_one_step() {
        use CheckpointStatus::*;
        assert!(Pending.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Ready.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Ready));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_initial_set_has_five_unique_pending() {
        let set = Checkpoint::initial_set(ProgramId::generate());
        assert_eq!(set.len(), TOTAL_CHECKPOINTS);
        for (i, cp) in set.iter().enumerate() {
            assert_eq!(cp.number.get() as usize, i + 1);
            assert_eq!(cp.status, CheckpointStatus::Pending);
            assert_eq!(cp.checkpoint_type, cp.number.checkpoint_type());
        }
    }

    #[test]
    fn test_view_flags() {
        let mut cp = Checkpoint::pending(ProgramId::generate(), CheckpointNumber::new(2).unwrap());
        let view = cp.view();
        assert!(!view.can_acknowledge && !view.is_complete);
        assert_eq!(view.label, "Onboarding Confirmation");

        cp.status = CheckpointStatus::Ready;
        assert!(cp.view().can_acknowledge);

        cp.status = CheckpointStatus::Completed;
        let view = cp.view();
        assert!(view.is_complete && !view.can_acknowledge);
    }
}
