// Attendance Tracker - Core Library
// Scrapes the student portal and derives attendance statistics for the CLI and API server

pub mod error;
pub mod config;
pub mod crypto;      // FormCryptor
pub mod session;     // SessionNegotiator
pub mod parser;      // AttendanceTableParser
pub mod aggregator;  // AttendanceAggregator
pub mod fetcher;
pub mod comparison;  // ComparisonEngine
pub mod projection;  // ProjectionEngine
pub mod telemetry;

// Re-export commonly used types
pub use error::{AttendanceError, Result};
pub use config::{PortalConfig, ServerConfig};
pub use crypto::encrypt_password;
pub use session::{Credentials, FormTokens, SessionHandle, SessionNegotiator};
pub use parser::{AttendanceTableParser, ParsedReport, ReportLayout, SubjectRecord};
pub use aggregator::{
    AttendanceAggregator, AttendanceRecord, ThresholdProjection, TotalInfo, ATTENDANCE_THRESHOLD,
};
pub use fetcher::{AttendanceSource, PortalClient};
pub use comparison::{BatchEntry, ComparisonEngine, ComparisonResult, StudentOutcome, SubjectLeader};
pub use projection::{parse_skip_hours, ProjectionEngine, SkipOutcome, SkipProjection, SkipStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
