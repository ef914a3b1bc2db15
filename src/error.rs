// ⚠️ Error taxonomy for the scrape-and-extract pipeline
// Every failure a fetch can hit maps onto one of these kinds

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttendanceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttendanceError {
    /// Transport failure reaching the portal (or the login page was unusable)
    #[error("failed to fetch from attendance portal: {0}")]
    FetchFailed(String),

    /// Login POST did not hand back both session cookies
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Report HTML does not match the expected fixed layout
    #[error("malformed attendance report: {0}")]
    MalformedReport(String),

    /// Missing or non-numeric request parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cipher could not be constructed for the password field
    #[error("password encryption failed: {0}")]
    EncryptionFailed(String),
}

impl AttendanceError {
    /// Only bad caller input is the client's fault; everything else is a 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AttendanceError::InvalidInput(_))
    }

    /// Message safe to hand back to an API caller.
    ///
    /// Transport details and portal responses stay in the log; input errors
    /// carry their own description because it names the offending parameter.
    pub fn public_message(&self) -> String {
        match self {
            AttendanceError::FetchFailed(_) => "Failed to fetch attendance data".to_string(),
            AttendanceError::AuthenticationFailed(_) => {
                "Login failed: check student_id and password".to_string()
            }
            AttendanceError::MalformedReport(_) => "Failed to parse attendance data".to_string(),
            AttendanceError::InvalidInput(msg) => msg.clone(),
            AttendanceError::EncryptionFailed(_) => "Failed to fetch attendance data".to_string(),
        }
    }
}

impl From<reqwest::Error> for AttendanceError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL so query strings never end up in messages
        AttendanceError::FetchFailed(err.without_url().to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
