// ⚙️ Configuration - portal constants and server settings
// Defaults reproduce the live portal; every value can be overridden from the environment

use crate::error::{AttendanceError, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_LOGIN_URL: &str = "https://webprosindia.com/vignanit/default.aspx";
pub const DEFAULT_REPORT_URL: &str =
    "https://webprosindia.com/vignanit/Academics/studentacadamicregister.aspx";
pub const DEFAULT_REPORT_REFERER: &str = "https://webprosindia.com/vignanit/StudentMaster.aspx";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Key and IV the portal's login script uses for the hidden password field.
/// Not a secret: the same value ships to every browser.
pub const PORTAL_CIPHER_KEY: &str = "8701661282118308";
pub const PORTAL_CIPHER_IV: &str = "8701661282118308";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

// ============================================================================
// ENV HELPERS
// ============================================================================

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

// ============================================================================
// PORTAL CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    /// Login page; the login form also posts back here
    pub login_url: String,

    /// Attendance report page (queried with the report selector)
    pub report_url: String,

    /// Referer the portal expects on the report request
    pub report_referer: String,

    /// Browser-like user agent; the portal rejects bare clients
    pub user_agent: String,

    /// Cipher key for the hidden password field
    pub cipher_key: String,

    /// Cipher IV for the hidden password field
    pub cipher_iv: String,

    /// Per-request timeout of the HTTP client
    pub timeout: Duration,
}

impl PortalConfig {
    /// Defaults overridden by `ATTENDANCE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = PortalConfig::default();
        PortalConfig {
            login_url: env_string("ATTENDANCE_LOGIN_URL", &defaults.login_url),
            report_url: env_string("ATTENDANCE_REPORT_URL", &defaults.report_url),
            report_referer: env_string("ATTENDANCE_REPORT_REFERER", &defaults.report_referer),
            user_agent: env_string("ATTENDANCE_USER_AGENT", &defaults.user_agent),
            cipher_key: defaults.cipher_key,
            cipher_iv: defaults.cipher_iv,
            timeout: Duration::from_secs(env_u64(
                "ATTENDANCE_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }

    /// Scheme + host of the login page, sent as the Origin header
    pub fn origin(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.login_url).map_err(|e| {
            AttendanceError::FetchFailed(format!("invalid login URL {}: {}", self.login_url, e))
        })?;

        let host = url.host_str().ok_or_else(|| {
            AttendanceError::FetchFailed(format!("login URL has no host: {}", self.login_url))
        })?;

        // port() is None when it is the scheme's default
        Ok(match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        })
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            report_url: DEFAULT_REPORT_URL.to_string(),
            report_referer: DEFAULT_REPORT_REFERER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cipher_key: PORTAL_CIPHER_KEY.to_string(),
            cipher_iv: PORTAL_CIPHER_IV.to_string(),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

// ============================================================================
// SERVER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_json: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        ServerConfig {
            bind_addr: env_string("ATTENDANCE_BIND", DEFAULT_BIND_ADDR),
            log_json: env_bool("ATTENDANCE_LOG_JSON", false),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_login_url() {
        let config = PortalConfig::default();
        assert_eq!(config.origin().unwrap(), "https://webprosindia.com");
    }

    #[test]
    fn test_origin_keeps_non_default_port() {
        let config = PortalConfig {
            login_url: "http://127.0.0.1:8081/vignanit/default.aspx".to_string(),
            ..PortalConfig::default()
        };
        assert_eq!(config.origin().unwrap(), "http://127.0.0.1:8081");
    }

    #[test]
    fn test_origin_rejects_garbage_url() {
        let config = PortalConfig {
            login_url: "not a url".to_string(),
            ..PortalConfig::default()
        };
        assert!(matches!(config.origin(), Err(AttendanceError::FetchFailed(_))));
    }

    #[test]
    fn test_default_cipher_material_is_block_sized() {
        let config = PortalConfig::default();
        assert_eq!(config.cipher_key.len(), 16);
        assert_eq!(config.cipher_iv.len(), 16);
    }
}
