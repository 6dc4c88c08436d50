//! Sponsored programs and their lifecycle status

use crate::checkpoint::CheckpointNumber;
use crate::ids::{ProgramId, SponsorId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse lifecycle status of a program.
///
/// Variants are declared in lifecycle order, so the derived `Ord` is the
/// rank used to keep status advances monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Draft,
    Approved,
    ImplementationInProgress,
    MidProgramReviewCompleted,
    Completed,
}

impl ProgramStatus {
    /// Status a program reaches once the given checkpoint is acknowledged.
    ///
    /// Checkpoint 5 (extension/renewal) has no mapping and leaves the
    /// program status where it is.
    pub fn after_checkpoint(number: CheckpointNumber) -> Option<ProgramStatus> {
        match number.get() {
            1 => Some(ProgramStatus::Approved),
            2 => Some(ProgramStatus::ImplementationInProgress),
            3 => Some(ProgramStatus::MidProgramReviewCompleted),
            4 => Some(ProgramStatus::Completed),
            _ => None,
        }
    }

    /// Numeric lifecycle rank, persisted alongside the status so storage
    /// backends can guard against regressions.
    pub fn rank(&self) -> i16 {
        match self {
            ProgramStatus::Draft => 0,
            ProgramStatus::Approved => 1,
            ProgramStatus::ImplementationInProgress => 2,
            ProgramStatus::MidProgramReviewCompleted => 3,
            ProgramStatus::Completed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Draft => "draft",
            ProgramStatus::Approved => "approved",
            ProgramStatus::ImplementationInProgress => "implementation_in_progress",
            ProgramStatus::MidProgramReviewCompleted => "mid_program_review_completed",
            ProgramStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate metrics cache maintained by the reporting side of the platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramMetrics {
    #[serde(default)]
    pub students_onboarded: Option<u64>,
    #[serde(default)]
    pub active_students: Option<u64>,
    #[serde(default)]
    pub participation_rate: Option<f64>,
    #[serde(default)]
    pub completion_rate: Option<f64>,
}

/// A CSR-sponsored program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub sponsor_id: SponsorId,
    pub name: String,
    pub status: ProgramStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub metrics: Option<ProgramMetrics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// Build a fresh program in `draft` from a creation request
    pub fn from_request(request: NewProgram) -> Self {
        let now = Utc::now();
        Self {
            id: ProgramId::generate(),
            sponsor_id: request.sponsor_id,
            name: request.name,
            status: ProgramStatus::Draft,
            start_date: request.start_date,
            end_date: request.end_date,
            metrics: request.metrics,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status, never moving it backwards.
    ///
    /// Returns `true` if the status changed.
    pub fn advance_status(&mut self, target: ProgramStatus) -> bool {
        if target > self.status {
            self.status = target;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
        }
    }
}

/// Request to create a program; consumed by provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProgram {
    pub sponsor_id: SponsorId,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub metrics: Option<ProgramMetrics>,
}

/// Program fields returned from an acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub id: ProgramId,
    pub name: String,
    pub status: ProgramStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Program {
        Program::from_request(NewProgram {
            sponsor_id: SponsorId::generate(),
            name: "Coding Clubs".into(),
            start_date: None,
            end_date: None,
            metrics: None,
        })
    }

    #[test]
    fn test_new_program_starts_in_draft() {
        assert_eq!(program().status, ProgramStatus::Draft);
    }

    #[test]
    fn test_checkpoint_status_mapping() {
        let expect = [
            (1, Some(ProgramStatus::Approved)),
            (2, Some(ProgramStatus::ImplementationInProgress)),
            (3, Some(ProgramStatus::MidProgramReviewCompleted)),
            (4, Some(ProgramStatus::Completed)),
            (5, None),
        ];
        for (n, status) in expect {
            let number = CheckpointNumber::new(n).unwrap();
            assert_eq!(ProgramStatus::after_checkpoint(number), status, "checkpoint {n}");
        }
    }

    #[test]
    fn test_advance_status_is_monotonic() {
        let mut p = program();
        assert!(p.advance_status(ProgramStatus::ImplementationInProgress));
        assert!(!p.advance_status(ProgramStatus::Approved));
        assert_eq!(p.status, ProgramStatus::ImplementationInProgress);
        assert!(!p.advance_status(ProgramStatus::ImplementationInProgress));
    }

    #[test]
    fn test_rank_agrees_with_ordering() {
        let all = [
            ProgramStatus::Draft,
            ProgramStatus::Approved,
            ProgramStatus::ImplementationInProgress,
            ProgramStatus::MidProgramReviewCompleted,
            ProgramStatus::Completed,
        ];
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&ProgramStatus::MidProgramReviewCompleted).unwrap();
        assert_eq!(json, "\"mid_program_review_completed\"");
        assert_eq!(
            ProgramStatus::ImplementationInProgress.to_string(),
            "implementation_in_progress"
        );
    }
}
