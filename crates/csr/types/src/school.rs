//! Schools assigned to programs

use crate::ids::{ProgramId, SchoolId};
use serde::{Deserialize, Serialize};

/// A school participating in a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    /// Program the school is assigned to, if any
    pub program_id: Option<ProgramId>,
    pub name: String,
    #[serde(default)]
    pub student_count: u64,
}

impl School {
    pub fn assigned(program_id: ProgramId, name: impl Into<String>, student_count: u64) -> Self {
        Self {
            id: SchoolId::generate(),
            program_id: Some(program_id),
            name: name.into(),
            student_count,
        }
    }
}
