// 🏆 Comparison Engine - batch fetch + per-subject leaderboard
//
// Each student is fetched on its own thread with its own session.
// Threads only return immutable outcomes; the leaderboard is built in one
// pass after every thread has joined, so nothing is shared while fetching.

use crate::aggregator::AttendanceRecord;
use crate::error::AttendanceError;
use crate::fetcher::AttendanceSource;
use crate::session::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use tracing::warn;

/// Upper bound on simultaneous portal logins per batch
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

// ============================================================================
// BATCH INPUT / OUTPUT
// ============================================================================

/// One `{student_id, password}` object of a comparison request.
/// Fields are optional so one bad entry fails alone instead of the whole batch.
#[derive(Clone, Default, Deserialize)]
pub struct BatchEntry {
    pub student_id: Option<String>,
    pub password: Option<String>,
}

impl BatchEntry {
    pub fn new(student_id: &str, password: &str) -> Self {
        BatchEntry {
            student_id: Some(student_id.to_string()),
            password: Some(password.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StudentOutcome {
    Fetched {
        student_id: String,

        #[serde(flatten)]
        record: AttendanceRecord,

        // Totals repeated at entry level for existing /compare clients
        total_attended: u32,
        total_held: u32,
        total_percentage: f64,

        /// Positive = hours that can be skipped, negative = shortfall
        hours_status: i64,
    },
    Failed {
        student_id: String,
        error: String,
    },
}

impl StudentOutcome {
    fn from_result(student_id: String, result: Result<AttendanceRecord, AttendanceError>) -> Self {
        match result {
            Ok(record) => StudentOutcome::Fetched {
                student_id,
                total_attended: record.total_attended(),
                total_held: record.total_held(),
                total_percentage: record.total_percentage(),
                hours_status: record.threshold().hours_status(),
                record,
            },
            Err(err) => {
                warn!(student_id = %student_id, error = %err, "student fetch failed");
                StudentOutcome::Failed {
                    student_id,
                    error: err.public_message(),
                }
            }
        }
    }

    pub fn student_id(&self) -> &str {
        match self {
            StudentOutcome::Fetched { student_id, .. } | StudentOutcome::Failed { student_id, .. } => {
                student_id
            }
        }
    }

    pub fn record(&self) -> Option<&AttendanceRecord> {
        match self {
            StudentOutcome::Fetched { record, .. } => Some(record),
            StudentOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StudentOutcome::Failed { .. })
    }
}

/// Best percentage in a subject and everyone who reached it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectLeader {
    pub max_percentage: f64,
    pub top_students: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// One entry per input entry, in input order
    pub students: Vec<StudentOutcome>,

    pub subject_points_summary: BTreeMap<String, SubjectLeader>,
}

impl ComparisonResult {
    pub fn outcome(&self, student_id: &str) -> Option<&StudentOutcome> {
        self.students.iter().find(|s| s.student_id() == student_id)
    }
}

// ============================================================================
// COMPARISON ENGINE
// ============================================================================

pub struct ComparisonEngine<'a, S: AttendanceSource + ?Sized> {
    source: &'a S,

    /// Students fetched at the same time (default: 8)
    pub max_concurrency: usize,
}

impl<'a, S: AttendanceSource + ?Sized> ComparisonEngine<'a, S> {
    pub fn new(source: &'a S) -> Self {
        ComparisonEngine {
            source,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fetch every entry independently, then rank subjects
    pub fn compare(&self, entries: &[BatchEntry]) -> ComparisonResult {
        let mut students = Vec::with_capacity(entries.len());

        for chunk in entries.chunks(self.max_concurrency.max(1)) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|entry| {
                        let student_id = entry.student_id.clone().unwrap_or_default();
                        (student_id, scope.spawn(move || self.fetch_one(entry)))
                    })
                    .collect();

                for (student_id, handle) in handles {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        StudentOutcome::from_result(
                            student_id,
                            Err(AttendanceError::FetchFailed("fetch thread panicked".to_string())),
                        )
                    });
                    students.push(outcome);
                }
            });
        }

        let subject_points_summary = build_leaderboard(&students);
        ComparisonResult {
            students,
            subject_points_summary,
        }
    }

    fn fetch_one(&self, entry: &BatchEntry) -> StudentOutcome {
        let student_id = entry.student_id.clone().unwrap_or_default();
        let result = Credentials::from_parts(entry.student_id.as_deref(), entry.password.as_deref())
            .and_then(|credentials| self.source.fetch(&credentials));
        StudentOutcome::from_result(student_id, result)
    }
}

/// Per subject: maximum percentage and every student at that maximum.
///
/// Two passes (max first, then equality against it) so the tie set does not
/// depend on the order students were fetched in.
pub fn build_leaderboard(students: &[StudentOutcome]) -> BTreeMap<String, SubjectLeader> {
    let scores: Vec<(&str, &str, f64)> = students
        .iter()
        .filter_map(|s| s.record().map(|r| (s.student_id(), r)))
        .flat_map(|(id, record)| {
            record
                .subjectwise_summary()
                .map(move |subject| (subject.subject_name.as_str(), id, subject.percentage_value()))
        })
        .collect();

    let mut max_by_subject: BTreeMap<&str, f64> = BTreeMap::new();
    for &(subject, _, pct) in &scores {
        max_by_subject
            .entry(subject)
            .and_modify(|max| *max = max.max(pct))
            .or_insert(pct);
    }

    let mut leaderboard: BTreeMap<String, SubjectLeader> = max_by_subject
        .iter()
        .map(|(subject, &max)| {
            (
                subject.to_string(),
                SubjectLeader {
                    max_percentage: max,
                    top_students: BTreeSet::new(),
                },
            )
        })
        .collect();

    for &(subject, student_id, pct) in &scores {
        if let Some(leader) = leaderboard.get_mut(subject) {
            if pct == leader.max_percentage {
                leader.top_students.insert(student_id.to_string());
            }
        }
    }

    leaderboard
}

// ============================================================================
// TESTS
// ============================================================================
