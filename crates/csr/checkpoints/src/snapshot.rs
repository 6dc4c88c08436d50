//! Point-in-time program metrics captured when a checkpoint is triggered

use crate::error::{CheckpointError, CheckpointResult};
use chrono::Utc;
use csr_store::Storage;
use csr_types::{MetricsSnapshot, ProgramId};
use std::sync::Arc;

/// Builds [`MetricsSnapshot`]s from the program aggregate and its schools
#[derive(Clone)]
pub struct MetricsSnapshotProvider {
    storage: Arc<dyn Storage>,
}

impl MetricsSnapshotProvider {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Capture the current metrics of a program.
    ///
    /// `students_onboarded` prefers the stored aggregate and falls back to
    /// the sum of assigned schools' student counts when the aggregate is
    /// missing or zero. Missing rates and active counts become zero.
    pub async fn capture(&self, program_id: &ProgramId) -> CheckpointResult<MetricsSnapshot> {
        let program = self
            .storage
            .get_program(program_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Program not found".to_string()))?;

        let schools = self.storage.list_schools_for_program(program_id).await?;
        let metrics = program.metrics.unwrap_or_default();

        let students_onboarded = match metrics.students_onboarded {
            Some(n) if n > 0 => n,
            _ => schools.iter().map(|s| s.student_count).sum(),
        };

        Ok(MetricsSnapshot {
            students_onboarded,
            active_students: metrics.active_students.unwrap_or(0),
            participation_rate: metrics.participation_rate.unwrap_or(0.0),
            completion_rate: metrics.completion_rate.unwrap_or(0.0),
            schools_implemented: schools.len() as u64,
            captured_at: Utc::now(),
        })
    }
}
