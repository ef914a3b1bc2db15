// Attendance Tracker - Web Server
// JSON API over the scrape pipeline: /attendance, /compare, /skip

use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use attendance_tracker::telemetry::init_tracing;
use attendance_tracker::{
    parse_skip_hours, AttendanceError, AttendanceRecord, AttendanceSource, BatchEntry,
    ComparisonEngine, ComparisonResult, Credentials, PortalClient, PortalConfig, ProjectionEngine,
    ServerConfig, SkipProjection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Span};

/// Shared application state
#[derive(Clone)]
struct AppState {
    source: Arc<dyn AttendanceSource>,
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct AttendanceQuery {
    student_id: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct SkipQuery {
    student_id: Option<String>,
    password: Option<String>,
    hours: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Library error on its way out as `{"error": ...}`
struct ApiError(AttendanceError);

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            error: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Blocking bridge
// ============================================================================

/// Portal fetches are blocking network sequences; keep them off the async workers
async fn blocking<T, F>(job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AttendanceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("fetch task failed: {}", e);
            Err(ApiError(AttendanceError::FetchFailed(
                "fetch task did not complete".to_string(),
            )))
        }
    }
}

async fn fetch_record(state: &AppState, credentials: Credentials) -> Result<AttendanceRecord, ApiError> {
    let source = state.source.clone();
    let student_id = credentials.student_id.clone();

    blocking(move || source.fetch(&credentials)).await.map_err(|e| {
        warn!(student_id = %student_id, error = %e.0, "attendance fetch failed");
        e
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": attendance_tracker::VERSION }))
}

/// GET /attendance?student_id=&password= - One student's record
async fn get_attendance(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let credentials =
        Credentials::from_parts(query.student_id.as_deref(), query.password.as_deref())?;

    let record = fetch_record(&state, credentials).await?;
    Ok(Json(record))
}

/// POST /compare - Batch of [{student_id, password}] → per-student results + leaderboard
async fn compare_attendance(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ComparisonResult>, ApiError> {
    let entries: Vec<BatchEntry> = serde_json::from_slice(&body)
        .ok()
        .filter(|entries: &Vec<BatchEntry>| !entries.is_empty())
        .ok_or_else(|| {
            AttendanceError::InvalidInput(
                "Invalid input. Expecting a list of student credentials.".to_string(),
            )
        })?;

    let source = state.source.clone();
    let result = blocking(move || Ok(ComparisonEngine::new(source.as_ref()).compare(&entries))).await?;

    info!(
        students = result.students.len(),
        failed = result.students.iter().filter(|s| s.is_failed()).count(),
        "comparison complete"
    );
    Ok(Json(result))
}

/// GET /skip?student_id=&password=&hours= - Projection after skipping `hours`
async fn skip_projection(
    State(state): State<AppState>,
    Query(query): Query<SkipQuery>,
) -> Result<Json<SkipProjection>, ApiError> {
    let (Some(student_id), Some(password), Some(hours)) =
        (query.student_id.as_deref(), query.password.as_deref(), query.hours.as_deref())
    else {
        return Err(AttendanceError::InvalidInput(
            "Missing student_id, password, or hours".to_string(),
        )
        .into());
    };

    // Bad input is rejected before any portal traffic
    let skip_hours = parse_skip_hours(hours)?;
    let credentials = Credentials::from_parts(Some(student_id), Some(password))?;

    let record = fetch_record(&state, credentials).await?;
    Ok(Json(ProjectionEngine::new().project(&record, skip_hours)))
}

/// Request span without the query string, which carries the password
fn request_span(request: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    )
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/attendance", get(get_attendance))
        .route("/compare", post(compare_attendance))
        .route("/skip", get(skip_projection))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_config = ServerConfig::from_env();
    init_tracing(server_config.log_json, "info");

    let portal_config = PortalConfig::from_env();
    info!(login_url = %portal_config.login_url, "portal configured");

    let state = AppState {
        source: Arc::new(PortalClient::new(portal_config)),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_config.bind_addr))?;

    info!(addr = %server_config.bind_addr, "attendance server listening");

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
