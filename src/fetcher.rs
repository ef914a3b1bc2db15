// 🔄 Fetch pipeline - session → report HTML → parsed rows → aggregated record
//
// AttendanceSource is the seam between the engines and the network:
// the portal client implements it, tests plug in in-memory sources.

use crate::aggregator::{AttendanceAggregator, AttendanceRecord};
use crate::config::PortalConfig;
use crate::error::Result;
use crate::parser::AttendanceTableParser;
use crate::session::{Credentials, SessionNegotiator};
use tracing::{info, info_span};

/// Anything that can produce an attendance record for one student
pub trait AttendanceSource: Send + Sync {
    /// One complete, independent fetch. No state survives between calls.
    fn fetch(&self, credentials: &Credentials) -> Result<AttendanceRecord>;
}

// ============================================================================
// PORTAL CLIENT
// ============================================================================

pub struct PortalClient {
    config: PortalConfig,
    parser: AttendanceTableParser,
    aggregator: AttendanceAggregator,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Self {
        PortalClient {
            config,
            parser: AttendanceTableParser::new(),
            aggregator: AttendanceAggregator::new(),
        }
    }

    /// Log in and download the raw report page
    pub fn fetch_report_html(&self, credentials: &Credentials) -> Result<String> {
        // Fresh client per fetch: cookies and connections die with it
        let negotiator = SessionNegotiator::new(self.config.clone())?;
        let handle = negotiator.negotiate(credentials)?;
        negotiator.fetch_report(handle)
    }
}

impl AttendanceSource for PortalClient {
    fn fetch(&self, credentials: &Credentials) -> Result<AttendanceRecord> {
        let span = info_span!("fetch_attendance", student_id = %credentials.student_id);
        let _guard = span.enter();

        let html = self.fetch_report_html(credentials)?;
        let parsed = self.parser.parse(&html)?;
        let record = self.aggregator.aggregate(parsed)?;

        info!(
            roll_number = %record.roll_number,
            subjects = record.subjectwise_summary().count(),
            total_percentage = record.total_percentage(),
            "attendance fetched"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttendanceError;
    use std::time::Duration;

    #[test]
    fn test_unreachable_portal_is_fetch_failure() {
        // Nothing listens on the discard port locally
        let config = PortalConfig {
            login_url: "http://127.0.0.1:9/vignanit/default.aspx".to_string(),
            report_url: "http://127.0.0.1:9/vignanit/report.aspx".to_string(),
            timeout: Duration::from_secs(2),
            ..PortalConfig::default()
        };
        let client = PortalClient::new(config);

        let result = client.fetch(&Credentials::new("21L31A0501", "hunter2"));
        assert!(
            matches!(result, Err(AttendanceError::FetchFailed(_))),
            "expected FetchFailed, got {:?}",
            result
        );
    }
}
