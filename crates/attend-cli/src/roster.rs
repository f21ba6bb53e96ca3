//! Attendance roster: every enrolled student marked present or absent.

use attend_core::{IdentityId, PresenceSet};
use attend_engine::RunReport;
use attend_store::Student;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub student_id: IdentityId,
    pub name: String,
    pub roll_number: String,
    pub status: AttendanceStatus,
    pub marked_by_ai: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    pub message: String,
    pub total_students: usize,
    pub detected_count: usize,
    pub results: Vec<RosterEntry>,
}

impl Roster {
    /// `students` should already be in roll-number order.
    pub fn build(students: &[Student], present: &PresenceSet) -> Self {
        let results: Vec<RosterEntry> = students
            .iter()
            .map(|s| {
                let seen = present.contains(&s.id);
                RosterEntry {
                    student_id: s.id.clone(),
                    name: s.name.clone(),
                    roll_number: s.roll_number.clone(),
                    status: if seen { AttendanceStatus::Present } else { AttendanceStatus::Absent },
                    marked_by_ai: seen,
                }
            })
            .collect();

        Self {
            // Counts every recognized identity, including any outside this roster.
            message: format!("Detected {} students", present.len()),
            total_students: results.len(),
            detected_count: results
                .iter()
                .filter(|r| r.status == AttendanceStatus::Present)
                .count(),
            results,
        }
    }
}

/// Roster plus the run diagnostics, as printed by `attend scan`.
#[derive(Debug, Serialize)]
pub struct ScanOutput<'a> {
    #[serde(flatten)]
    pub roster: Roster,
    pub run: &'a RunReport,
}
