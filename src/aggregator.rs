// 📊 Attendance Aggregator - totals, percentage and the 75% threshold
//
// Threshold arithmetic, with T = 0.75:
//   below T:  additional_hours_needed = trunc((T*held - attended) / (1 - T))
//   at/above: hours_can_skip          = trunc((attended - T*held) / T)
//
// Truncation (not ceiling) keeps output identical to the portal tools
// students already compare against.

use crate::error::{AttendanceError, Result};
use crate::parser::{ParsedReport, SubjectRecord};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Minimum attendance ratio required by the institution
pub const ATTENDANCE_THRESHOLD: f64 = 0.75;

// ============================================================================
// THRESHOLD PROJECTION
// ============================================================================

/// Which side of the threshold a student is on, and by how many hours.
/// Serialized as a single `additional_hours_needed` or `hours_can_skip` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThresholdProjection {
    /// Consecutive hours to attend before reaching the threshold
    #[serde(rename = "additional_hours_needed")]
    NeedsMoreHours(u32),

    /// Hours that can be missed while staying at or above the threshold
    #[serde(rename = "hours_can_skip")]
    CanSkipHours(u32),
}

impl ThresholdProjection {
    /// Classify totals. `held` must be non-zero.
    pub fn from_totals(attended: u32, held: u32) -> Self {
        let attended_f = attended as f64;
        let held_f = held as f64;

        if attendance_percentage(attended, held) < ATTENDANCE_THRESHOLD * 100.0 {
            let needed = (ATTENDANCE_THRESHOLD * held_f - attended_f) / (1.0 - ATTENDANCE_THRESHOLD);
            ThresholdProjection::NeedsMoreHours(needed as u32)
        } else {
            let spare = (attended_f - ATTENDANCE_THRESHOLD * held_f) / ATTENDANCE_THRESHOLD;
            ThresholdProjection::CanSkipHours(spare as u32)
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, ThresholdProjection::CanSkipHours(_))
    }

    /// Single signed figure: positive = hours that can be skipped, negative = shortfall
    pub fn hours_status(&self) -> i64 {
        match self {
            ThresholdProjection::CanSkipHours(h) => *h as i64,
            ThresholdProjection::NeedsMoreHours(h) => -(*h as i64),
        }
    }
}

/// 100 * attended / held, computed in the same order as the legacy output
pub fn attendance_percentage(attended: u32, held: u32) -> f64 {
    attended as f64 / held as f64 * 100.0
}

// ============================================================================
// ATTENDANCE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalInfo {
    pub total_attended: u32,
    pub total_held: u32,
    pub total_percentage: f64,

    #[serde(flatten)]
    pub threshold: ThresholdProjection,
}

/// Result of one fetch, built once and only read afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub roll_number: String,

    /// All subject rows in page order, zero-held rows included
    pub subjects: Vec<SubjectRecord>,

    pub total_info: TotalInfo,
}

impl AttendanceRecord {
    /// Subjects that have had at least one class
    pub fn subjectwise_summary(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.subjects.iter().filter(|s| s.has_classes())
    }

    pub fn total_attended(&self) -> u32 {
        self.total_info.total_attended
    }

    pub fn total_held(&self) -> u32 {
        self.total_info.total_held
    }

    pub fn total_percentage(&self) -> f64 {
        self.total_info.total_percentage
    }

    pub fn threshold(&self) -> ThresholdProjection {
        self.total_info.threshold
    }
}

impl Serialize for AttendanceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let subjectwise: Vec<&SubjectRecord> = self.subjectwise_summary().collect();
        let no_entries: [SubjectRecord; 0] = [];

        let mut state = serializer.serialize_struct("AttendanceRecord", 4)?;
        state.serialize_field("roll_number", &self.roll_number)?;
        // Always empty; kept because existing clients expect the key
        state.serialize_field("attendance_summary", &no_entries)?;
        state.serialize_field("subjectwise_summary", &subjectwise)?;
        state.serialize_field("total_info", &self.total_info)?;
        state.end()
    }
}

// ============================================================================
// ATTENDANCE AGGREGATOR
// ============================================================================

pub struct AttendanceAggregator;

impl AttendanceAggregator {
    pub fn new() -> Self {
        AttendanceAggregator
    }

    /// Sum every subject row and classify against the threshold.
    ///
    /// Zero-held rows add nothing to the held total; a report where nothing
    /// has been held at all has no meaningful percentage and is rejected.
    pub fn aggregate(&self, report: ParsedReport) -> Result<AttendanceRecord> {
        let (total_attended, total_held) = report
            .subjects
            .iter()
            .fold((0u32, 0u32), |(attended, held), s| {
                (
                    attended.saturating_add(s.attended_hours()),
                    held.saturating_add(s.held_hours()),
                )
            });

        if total_held == 0 {
            return Err(AttendanceError::MalformedReport(
                "no held hours in any subject".to_string(),
            ));
        }

        Ok(AttendanceRecord {
            roll_number: report.roll_number,
            subjects: report.subjects,
            total_info: TotalInfo {
                total_attended,
                total_held,
                total_percentage: attendance_percentage(total_attended, total_held),
                threshold: ThresholdProjection::from_totals(total_attended, total_held),
            },
        })
    }
}

impl Default for AttendanceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
