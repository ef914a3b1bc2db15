// 🔮 Projection Engine - "what if I skip N more hours?"
// Skipped hours count as held with nothing attended, then the threshold is re-evaluated.

use crate::aggregator::{attendance_percentage, AttendanceRecord, ThresholdProjection};
use crate::error::{AttendanceError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipStatus {
    #[serde(rename = "safe to skip")]
    SafeToSkip,

    #[serde(rename = "needs to attend more")]
    NeedsToAttendMore,
}

/// Threshold figure after the skip; key names carry an `_after` suffix on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipOutcome {
    #[serde(rename = "hours_can_skip_after")]
    CanSkipAfter(u32),

    #[serde(rename = "additional_hours_needed_after")]
    NeedsAfter(u32),
}

impl From<ThresholdProjection> for SkipOutcome {
    fn from(projection: ThresholdProjection) -> Self {
        match projection {
            ThresholdProjection::CanSkipHours(h) => SkipOutcome::CanSkipAfter(h),
            ThresholdProjection::NeedsMoreHours(h) => SkipOutcome::NeedsAfter(h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipProjection {
    pub original_attendance_percentage: f64,
    pub new_attendance_percentage: f64,
    pub status: SkipStatus,

    #[serde(flatten)]
    pub outcome: SkipOutcome,
}

// ============================================================================
// PROJECTION ENGINE
// ============================================================================

pub struct ProjectionEngine;

impl ProjectionEngine {
    pub fn new() -> Self {
        ProjectionEngine
    }

    /// Re-evaluate the record as if `skip_hours` more classes were held and missed
    pub fn project(&self, record: &AttendanceRecord, skip_hours: u32) -> SkipProjection {
        let attended = record.total_attended();
        let new_held = record.total_held().saturating_add(skip_hours);
        let threshold = ThresholdProjection::from_totals(attended, new_held);

        SkipProjection {
            original_attendance_percentage: record.total_percentage(),
            new_attendance_percentage: attendance_percentage(attended, new_held),
            status: if threshold.is_safe() {
                SkipStatus::SafeToSkip
            } else {
                SkipStatus::NeedsToAttendMore
            },
            outcome: threshold.into(),
        }
    }
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `hours` request parameter: a non-negative integer
pub fn parse_skip_hours(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| AttendanceError::InvalidInput("Invalid hours parameter".to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
