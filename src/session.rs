// 🔑 Session Negotiator - two-step WebForms login
//
//   TokenFetch:   GET login page → viewstate triplet
//   Authenticate: POST tokens + credentials → ASP.NET_SessionId + frmAuth cookies
//
// The handle is then spent on exactly one report GET. Nothing is cached:
// tokens are single-use and the portal binds a session to one login.

use crate::config::PortalConfig;
use crate::crypto::encrypt_password;
use crate::error::{AttendanceError, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use std::fmt;
use tracing::{debug, info};

// Form protocol of the portal; names must match byte for byte
pub const FIELD_VIEWSTATE: &str = "__VIEWSTATE";
pub const FIELD_VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
pub const FIELD_EVENT_VALIDATION: &str = "__EVENTVALIDATION";
pub const FIELD_STUDENT_ID: &str = "txtId2";
pub const FIELD_PASSWORD: &str = "txtPwd2";
pub const FIELD_BUTTON_X: &str = "imgBtn2.x";
pub const FIELD_BUTTON_Y: &str = "imgBtn2.y";
pub const FIELD_ENCRYPTED_PASSWORD: &str = "hdnpwd2";

pub const COOKIE_SESSION_ID: &str = "ASP.NET_SessionId";
pub const COOKIE_AUTH: &str = "frmAuth";

/// Query parameter selecting the attendance register on the report page
pub const REPORT_SELECTOR: (&str, &str) = ("scrid", "2");

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ============================================================================
// CORE TYPES
// ============================================================================

/// Credentials for one fetch. Debug output redacts the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub student_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(student_id: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            student_id: student_id.into(),
            password: password.into(),
        }
    }

    /// Validate optional request fields into credentials
    pub fn from_parts(student_id: Option<&str>, password: Option<&str>) -> Result<Self> {
        match (student_id, password) {
            (Some(id), Some(pw)) if !id.trim().is_empty() && !pw.is_empty() => {
                Ok(Credentials::new(id.trim(), pw))
            }
            _ => Err(AttendanceError::InvalidInput(
                "Missing student_id or password".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("student_id", &self.student_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Viewstate triplet echoed back on the login POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

/// The two cookies proving an authenticated session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub auth: String,
}

impl SessionHandle {
    /// Explicit Cookie header for the report request
    pub fn cookie_header(&self) -> String {
        format!(
            "{}={}; {}={}",
            COOKIE_SESSION_ID, self.session_id, COOKIE_AUTH, self.auth
        )
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle(<redacted>)")
    }
}

// ============================================================================
// PROTOCOL HELPERS (pure, no network)
// ============================================================================

/// Pull the viewstate triplet out of the login page.
///
/// `__VIEWSTATE` is mandatory: without it the page is not the login form.
/// The other two fall back to empty, which the portal tolerates.
pub fn extract_form_tokens(html: &str) -> Result<FormTokens> {
    let document = Html::parse_document(html);

    let view_state = hidden_input_value(&document, FIELD_VIEWSTATE)?.ok_or_else(|| {
        AttendanceError::FetchFailed(format!("login page has no {} field", FIELD_VIEWSTATE))
    })?;

    Ok(FormTokens {
        view_state,
        view_state_generator: hidden_input_value(&document, FIELD_VIEWSTATE_GENERATOR)?
            .unwrap_or_default(),
        event_validation: hidden_input_value(&document, FIELD_EVENT_VALIDATION)?
            .unwrap_or_default(),
    })
}

fn hidden_input_value(document: &Html, name: &str) -> Result<Option<String>> {
    let selector = Selector::parse(&format!("input[name='{}']", name))
        .map_err(|e| AttendanceError::FetchFailed(format!("invalid selector: {:?}", e)))?;

    Ok(document
        .select(&selector)
        .next()
        .map(|input| input.value().attr("value").unwrap_or("").to_string()))
}

/// Ordered field list of the login POST
pub fn build_login_form(
    tokens: &FormTokens,
    credentials: &Credentials,
    encrypted_password: &str,
) -> Vec<(&'static str, String)> {
    vec![
        (FIELD_VIEWSTATE, tokens.view_state.clone()),
        (FIELD_VIEWSTATE_GENERATOR, tokens.view_state_generator.clone()),
        (FIELD_EVENT_VALIDATION, tokens.event_validation.clone()),
        (FIELD_STUDENT_ID, credentials.student_id.clone()),
        (FIELD_PASSWORD, credentials.password.clone()),
        (FIELD_BUTTON_X, "0".to_string()),
        (FIELD_BUTTON_Y, "0".to_string()),
        (FIELD_ENCRYPTED_PASSWORD, encrypted_password.to_string()),
    ]
}

/// Find both session cookies among the response's Set-Cookie headers
pub fn extract_session_cookies(headers: &HeaderMap) -> Result<SessionHandle> {
    let mut session_id = None;
    let mut auth = None;

    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        // "name=value; Path=/; HttpOnly" → name, value
        let pair = raw.split(';').next().unwrap_or("");
        let Some((name, val)) = pair.split_once('=') else { continue };
        let val = val.trim();
        if val.is_empty() {
            continue;
        }
        match name.trim() {
            COOKIE_SESSION_ID => session_id = Some(val.to_string()),
            COOKIE_AUTH => auth = Some(val.to_string()),
            _ => {}
        }
    }

    match (session_id, auth) {
        (Some(session_id), Some(auth)) => Ok(SessionHandle { session_id, auth }),
        (None, _) => Err(AttendanceError::AuthenticationFailed(format!(
            "{} cookie missing after login",
            COOKIE_SESSION_ID
        ))),
        (_, None) => Err(AttendanceError::AuthenticationFailed(format!(
            "{} cookie missing after login",
            COOKIE_AUTH
        ))),
    }
}

// ============================================================================
// SESSION NEGOTIATOR
// ============================================================================

pub struct SessionNegotiator {
    config: PortalConfig,
    client: Client,
}

impl SessionNegotiator {
    /// Build a negotiator with its own HTTP client (one per fetch).
    ///
    /// Redirects are not followed: the login response carries the cookies,
    /// and the page it redirects to is irrelevant.
    pub fn new(config: PortalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()?;

        Ok(SessionNegotiator { config, client })
    }

    /// TokenFetch → Authenticate
    pub fn negotiate(&self, credentials: &Credentials) -> Result<SessionHandle> {
        let tokens = self.fetch_tokens()?;
        debug!("login form tokens fetched");

        let handle = self.authenticate(&tokens, credentials)?;
        info!("portal session established");

        Ok(handle)
    }

    fn fetch_tokens(&self) -> Result<FormTokens> {
        let response = self
            .client
            .get(&self.config.login_url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()?;

        if !response.status().is_success() {
            return Err(AttendanceError::FetchFailed(format!(
                "login page returned {}",
                response.status()
            )));
        }

        let html = response.text()?;
        extract_form_tokens(&html)
    }

    fn authenticate(&self, tokens: &FormTokens, credentials: &Credentials) -> Result<SessionHandle> {
        let encrypted = encrypt_password(
            &credentials.password,
            &self.config.cipher_key,
            &self.config.cipher_iv,
        )?;
        let form = build_login_form(tokens, credentials, &encrypted);

        let response = self
            .client
            .post(&self.config.login_url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ORIGIN, self.config.origin()?)
            .header(REFERER, &self.config.login_url)
            .header(USER_AGENT, &self.config.user_agent)
            .form(&form)
            .send()?;

        debug!(status = %response.status(), "login form submitted");
        extract_session_cookies(response.headers())
    }

    /// Spend the handle on the single authenticated report GET
    pub fn fetch_report(&self, handle: SessionHandle) -> Result<String> {
        let response = self
            .client
            .get(&self.config.report_url)
            .query(&[REPORT_SELECTOR])
            .header(COOKIE, handle.cookie_header())
            .header(REFERER, &self.config.report_referer)
            .header(USER_AGENT, &self.config.user_agent)
            .send()?;

        if !response.status().is_success() {
            // An expired or rejected session usually bounces back to login
            return Err(AttendanceError::FetchFailed(format!(
                "attendance report returned {}",
                response.status()
            )));
        }

        Ok(response.text()?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use crate::parser::tests::REPORT_PAGE;
    use axum::extract::State;
    use axum::http::{Method, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Form, Router};
    use reqwest::header::{HeaderValue, LOCATION};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form method="post" action="./default.aspx" id="form1">
          <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="dDwtMTA4MzE0MjEwNTs7Pg==" />
          <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="CA0B0334" />
          <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="/wEWBAKx9+3" />
          <input name="txtId2" type="text" id="txtId2" />
          <input name="txtPwd2" type="password" id="txtPwd2" />
          <input type="image" name="imgBtn2" id="imgBtn2" src="images/login.gif" />
          <input type="hidden" name="hdnpwd2" id="hdnpwd2" />
        </form>
        </body></html>
    "#;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(SET_COOKIE, HeaderValue::from_str(c).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_form_tokens() {
        let tokens = extract_form_tokens(LOGIN_PAGE).unwrap();
        assert_eq!(tokens.view_state, "dDwtMTA4MzE0MjEwNTs7Pg==");
        assert_eq!(tokens.view_state_generator, "CA0B0334");
        assert_eq!(tokens.event_validation, "/wEWBAKx9+3");
    }

    #[test]
    fn test_extract_form_tokens_optional_fields_default_empty() {
        let html = r#"<form><input type="hidden" name="__VIEWSTATE" value="abc" /></form>"#;
        let tokens = extract_form_tokens(html).unwrap();
        assert_eq!(tokens.view_state, "abc");
        assert_eq!(tokens.view_state_generator, "");
        assert_eq!(tokens.event_validation, "");
    }

    #[test]
    fn test_extract_form_tokens_rejects_non_login_page() {
        let result = extract_form_tokens("<html><body>Service Unavailable</body></html>");
        assert!(matches!(result, Err(AttendanceError::FetchFailed(_))));
    }

    #[test]
    fn test_login_form_fields_and_order() {
        let tokens = extract_form_tokens(LOGIN_PAGE).unwrap();
        let creds = Credentials::new("21L31A0501", "hunter2");
        let form = build_login_form(&tokens, &creds, "CIPHERTEXT==");

        let names: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec![
                "__VIEWSTATE",
                "__VIEWSTATEGENERATOR",
                "__EVENTVALIDATION",
                "txtId2",
                "txtPwd2",
                "imgBtn2.x",
                "imgBtn2.y",
                "hdnpwd2",
            ]
        );
        assert_eq!(form[3].1, "21L31A0501");
        assert_eq!(form[4].1, "hunter2");
        assert_eq!(form[5].1, "0");
        assert_eq!(form[6].1, "0");
        assert_eq!(form[7].1, "CIPHERTEXT==");
    }

    #[test]
    fn test_extract_session_cookies() {
        let map = headers(&[
            "ASP.NET_SessionId=ptq1w2abc; path=/; HttpOnly; SameSite=Lax",
            "frmAuth=9F8E7D6C; path=/",
        ]);
        let handle = extract_session_cookies(&map).unwrap();
        assert_eq!(handle.session_id, "ptq1w2abc");
        assert_eq!(handle.auth, "9F8E7D6C");
        assert_eq!(
            handle.cookie_header(),
            "ASP.NET_SessionId=ptq1w2abc; frmAuth=9F8E7D6C"
        );
    }

    #[test]
    fn test_missing_auth_cookie_is_authentication_failure() {
        // Bad password: portal re-serves the login page with only a session cookie
        let map = headers(&["ASP.NET_SessionId=ptq1w2abc; path=/; HttpOnly"]);
        let result = extract_session_cookies(&map);
        assert!(matches!(result, Err(AttendanceError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_missing_session_cookie_is_authentication_failure() {
        let map = headers(&["frmAuth=9F8E7D6C; path=/"]);
        let result = extract_session_cookies(&map);
        assert!(matches!(result, Err(AttendanceError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_empty_cookie_value_does_not_count() {
        let map = headers(&["ASP.NET_SessionId=abc; path=/", "frmAuth=; expires=Thu, 01-Jan-1970 00:00:00 GMT"]);
        assert!(extract_session_cookies(&map).is_err());
    }

    #[test]
    fn test_credentials_from_parts() {
        let creds = Credentials::from_parts(Some(" 21L31A0501 "), Some("pw")).unwrap();
        assert_eq!(creds.student_id, "21L31A0501");

        assert!(Credentials::from_parts(None, Some("pw")).is_err());
        assert!(Credentials::from_parts(Some("id"), None).is_err());
        assert!(Credentials::from_parts(Some(""), Some("pw")).is_err());
        assert!(Credentials::from_parts(Some("id"), Some("")).is_err());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let creds = Credentials::new("21L31A0501", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));

        let handle = SessionHandle {
            session_id: "sess".into(),
            auth: "auth".into(),
        };
        assert!(!format!("{:?}", handle).contains("sess"));
    }

    // ------------------------------------------------------------------------
    // Full exchange against a local stand-in for the portal
    // ------------------------------------------------------------------------

    #[derive(Clone)]
    struct SeenRequest {
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        form: Vec<(String, String)>,
    }

    #[derive(Clone)]
    struct LocalPortal {
        seen: Arc<Mutex<Vec<SeenRequest>>>,
        grant_auth_cookie: bool,
    }

    impl LocalPortal {
        fn record(&self, method: Method, uri: &Uri, headers: HeaderMap, form: Vec<(String, String)>) {
            self.seen.lock().unwrap().push(SeenRequest {
                method,
                path: uri.path().to_string(),
                query: uri.query().map(str::to_string),
                headers,
                form,
            });
        }
    }

    async fn login_page(
        State(portal): State<LocalPortal>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        portal.record(method, &uri, headers, Vec::new());
        ([(CONTENT_TYPE, "text/html; charset=utf-8")], LOGIN_PAGE)
    }

    async fn login_submit(
        State(portal): State<LocalPortal>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        Form(form): Form<Vec<(String, String)>>,
    ) -> Response {
        portal.record(method, &uri, headers, form);

        let mut response = (StatusCode::FOUND, [(LOCATION, "StudentMaster.aspx")]).into_response();
        let cookies = response.headers_mut();
        cookies.append(
            SET_COOKIE,
            HeaderValue::from_static("ASP.NET_SessionId=localsession; path=/; HttpOnly"),
        );
        if portal.grant_auth_cookie {
            cookies.append(SET_COOKIE, HeaderValue::from_static("frmAuth=LOCALAUTH; path=/"));
        }
        response
    }

    async fn report_page(
        State(portal): State<LocalPortal>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        portal.record(method, &uri, headers, Vec::new());
        ([(CONTENT_TYPE, "text/html; charset=utf-8")], REPORT_PAGE)
    }

    /// Serve the three portal pages on an ephemeral port
    async fn start_local_portal(grant_auth_cookie: bool) -> (PortalConfig, Arc<Mutex<Vec<SeenRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let portal = LocalPortal {
            seen: seen.clone(),
            grant_auth_cookie,
        };
        let app = Router::new()
            .route("/vignanit/default.aspx", get(login_page).post(login_submit))
            .route("/vignanit/Academics/studentacadamicregister.aspx", get(report_page))
            .with_state(portal);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let base = format!("http://{}/vignanit", addr);
        let config = PortalConfig {
            login_url: format!("{}/default.aspx", base),
            report_url: format!("{}/Academics/studentacadamicregister.aspx", base),
            report_referer: format!("{}/StudentMaster.aspx", base),
            ..PortalConfig::default()
        };
        (config, seen)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_login_and_report_exchange() {
        let (config, seen) = start_local_portal(true).await;
        let origin = config.origin().unwrap();
        let login_url = config.login_url.clone();
        let report_referer = config.report_referer.clone();

        let html = tokio::task::spawn_blocking(move || -> Result<String> {
            let negotiator = SessionNegotiator::new(config)?;
            let handle = negotiator.negotiate(&Credentials::new("21L31A0501", "password"))?;
            negotiator.fetch_report(handle)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(html, REPORT_PAGE);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);

        // TokenFetch
        let token_fetch = &seen[0];
        assert_eq!(token_fetch.method, Method::GET);
        assert_eq!(token_fetch.path, "/vignanit/default.aspx");
        assert_eq!(token_fetch.headers[USER_AGENT], DEFAULT_USER_AGENT);

        // Authenticate
        let login = &seen[1];
        assert_eq!(login.method, Method::POST);
        assert_eq!(login.headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
        assert_eq!(login.headers[ORIGIN], origin.as_str());
        assert_eq!(login.headers[REFERER], login_url.as_str());
        assert_eq!(login.headers[USER_AGENT], DEFAULT_USER_AGENT);
        assert!(login.headers.get(COOKIE).is_none());

        let form: HashMap<&str, &str> = login
            .form
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(form.len(), 8);
        assert_eq!(form["__VIEWSTATE"], "dDwtMTA4MzE0MjEwNTs7Pg==");
        assert_eq!(form["__VIEWSTATEGENERATOR"], "CA0B0334");
        assert_eq!(form["__EVENTVALIDATION"], "/wEWBAKx9+3");
        assert_eq!(form["txtId2"], "21L31A0501");
        assert_eq!(form["txtPwd2"], "password");
        assert_eq!(form["imgBtn2.x"], "0");
        assert_eq!(form["imgBtn2.y"], "0");
        assert_eq!(form["hdnpwd2"], "y/2V2Eru+24PpaAezHSdAQ==");

        // Report GET
        let report = &seen[2];
        assert_eq!(report.method, Method::GET);
        assert_eq!(report.path, "/vignanit/Academics/studentacadamicregister.aspx");
        assert_eq!(report.query.as_deref(), Some("scrid=2"));
        assert_eq!(
            report.headers[COOKIE],
            "ASP.NET_SessionId=localsession; frmAuth=LOCALAUTH"
        );
        assert_eq!(report.headers[REFERER], report_referer.as_str());
        assert_eq!(report.headers[USER_AGENT], DEFAULT_USER_AGENT);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_login_without_auth_cookie_stops_before_report() {
        let (config, seen) = start_local_portal(false).await;

        let result = tokio::task::spawn_blocking(move || -> Result<SessionHandle> {
            let negotiator = SessionNegotiator::new(config)?;
            negotiator.negotiate(&Credentials::new("21L31A0501", "wrong"))
        })
        .await
        .unwrap();

        assert!(matches!(result, Err(AttendanceError::AuthenticationFailed(_))));
        let methods: Vec<Method> = seen.lock().unwrap().iter().map(|r| r.method.clone()).collect();
        assert_eq!(methods, vec![Method::GET, Method::POST]);
    }
}
