// 🧾 Attendance Table Parser - report HTML → structured rows
//
// The report has no semantic markup, only a positional table:
//   row 3, col 1          → roll number
//   row 7                 → subject table header (skipped)
//   row 8..               → one subject per row, "attended/held" then "percentage" as last two cells
//
// All positions live in ReportLayout so a portal redesign is a one-struct change.

use crate::error::{AttendanceError, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

const NBSP: char = '\u{a0}';

// ============================================================================
// CORE TYPES
// ============================================================================

/// One subject row of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectRecord {
    pub subject_name: String,

    /// Raw "attended/held" cell as the portal renders it
    pub attended_held: String,

    #[serde(skip)]
    pub hours: SubjectHours,

    /// Percentage exactly as rendered by the portal, e.g. "82.35%"
    pub percentage: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubjectHours {
    pub attended: u32,
    pub held: u32,
}

impl SubjectRecord {
    pub fn attended_hours(&self) -> u32 {
        self.hours.attended
    }

    pub fn held_hours(&self) -> u32 {
        self.hours.held
    }

    /// No classes held yet → nothing meaningful to report for this subject
    pub fn has_classes(&self) -> bool {
        self.hours.held > 0
    }

    /// Percentage as a number, trailing `%` stripped; unparseable → 0.0
    pub fn percentage_value(&self) -> f64 {
        self.percentage
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

/// Everything the parser extracts from one report page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub roll_number: String,

    /// Every subject row in page order, including rows with zero held hours
    pub subjects: Vec<SubjectRecord>,
}

// ============================================================================
// REPORT LAYOUT
// ============================================================================

/// Positional contract of the report page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLayout {
    /// CSS selector of the report table
    pub table_selector: String,

    /// Fewer rows than this → not a report page at all
    pub min_rows: usize,

    pub roll_number_row: usize,
    pub roll_number_col: usize,

    /// First row of the subject table (itself a header row)
    pub subject_table_start: usize,

    /// Column holding the subject name within a subject row
    pub subject_name_col: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        ReportLayout {
            table_selector: "#tblReport table".to_string(),
            min_rows: 4,
            roll_number_row: 3,
            roll_number_col: 1,
            subject_table_start: 7,
            subject_name_col: 1,
        }
    }
}

// ============================================================================
// ATTENDANCE TABLE PARSER
// ============================================================================

pub struct AttendanceTableParser {
    layout: ReportLayout,
}

impl AttendanceTableParser {
    /// Parser for the portal's current layout
    pub fn new() -> Self {
        AttendanceTableParser {
            layout: ReportLayout::default(),
        }
    }

    pub fn with_layout(layout: ReportLayout) -> Self {
        AttendanceTableParser { layout }
    }

    /// Parse the authenticated report page
    pub fn parse(&self, html: &str) -> Result<ParsedReport> {
        let rows = self.extract_rows(html)?;

        if rows.len() < self.layout.min_rows {
            // Typically the login page or an error page served in place of the report
            return Err(AttendanceError::MalformedReport(format!(
                "expected at least {} table rows, found {}",
                self.layout.min_rows,
                rows.len()
            )));
        }

        let roll_number = rows
            .get(self.layout.roll_number_row)
            .and_then(|row| row.get(self.layout.roll_number_col))
            .cloned()
            .ok_or_else(|| {
                AttendanceError::MalformedReport("roll number cell missing".to_string())
            })?;

        // Header row of the subject table is skipped
        let subject_rows = rows.iter().skip(self.layout.subject_table_start + 1);

        let mut subjects = Vec::new();
        for (offset, row) in subject_rows.enumerate() {
            match self.subject_from_row(row) {
                Some(subject) => subjects.push(subject),
                None => debug!(
                    row = self.layout.subject_table_start + 1 + offset,
                    cells = row.len(),
                    "skipping row too short to be a subject"
                ),
            }
        }

        Ok(ParsedReport {
            roll_number,
            subjects,
        })
    }

    /// Cell text of every row of the report table, cleaned
    pub fn extract_rows(&self, html: &str) -> Result<Vec<Vec<String>>> {
        let document = Html::parse_document(html);
        let table_selector = selector(&self.layout.table_selector)?;
        let row_selector = selector("tr")?;
        let cell_selector = selector("td")?;

        let Some(table) = document.select(&table_selector).next() else {
            return Ok(Vec::new());
        };

        Ok(table
            .select(&row_selector)
            .map(|row| row.select(&cell_selector).map(cell_text).collect())
            .collect())
    }

    fn subject_from_row(&self, row: &[String]) -> Option<SubjectRecord> {
        // name, attended/held and percentage must be distinct cells
        if row.len() < 3 || row.len() <= self.layout.subject_name_col {
            return None;
        }

        let attended_held = &row[row.len() - 2];
        let percentage = &row[row.len() - 1];
        let hours = parse_attended_held(attended_held);

        if hours.attended > hours.held && hours.held > 0 {
            warn!(
                subject = %row[self.layout.subject_name_col],
                attended = hours.attended,
                held = hours.held,
                "attended exceeds held"
            );
        }

        Some(SubjectRecord {
            subject_name: row[self.layout.subject_name_col].clone(),
            attended_held: attended_held.clone(),
            hours,
            percentage: percentage.clone(),
        })
    }
}

impl Default for AttendanceTableParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CELL HELPERS
// ============================================================================

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AttendanceError::MalformedReport(format!("invalid selector {}: {:?}", css, e)))
}

/// Trimmed text with the portal's U+00A0 blanks removed
fn cell_text(cell: ElementRef<'_>) -> String {
    clean_cell(&cell.text().collect::<String>())
}

pub fn clean_cell(raw: &str) -> String {
    raw.trim().chars().filter(|&c| c != NBSP).collect()
}

/// "45/50" → attended 45, held 50. A half that does not start with digits counts as 0.
pub fn parse_attended_held(cell: &str) -> SubjectHours {
    let (attended, held) = cell.split_once('/').unwrap_or((cell, ""));
    SubjectHours {
        attended: leading_count(attended),
        held: leading_count(held),
    }
}

fn leading_count(s: &str) -> u32 {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse::<u32>().unwrap_or(0)
}

// ============================================================================
// TESTS
// ============================================================================
