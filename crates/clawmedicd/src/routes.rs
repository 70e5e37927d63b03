//! API routes for clawmedicd
//!
//! - POST /v1/diagnose            payload JSON in, AnalysisResult out
//! - GET  /v1/fix/:id             stored result (`?format=script` for the script)
//! - GET  /v1/fix/:id/script      script text only
//! - POST /v1/fix/:id/feedback    outcome after running the script
//! - GET  /v1/catalog             known issue definitions
//! - GET  /v1/stats               per-issue ledger counters
//! - GET  /v1/health              liveness

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clawmedic_common::catalog::Severity;
use clawmedic_common::error::DoctorError;
use clawmedic_common::ledger::IssueStats;
use clawmedic_common::{AnalysisResult, Feedback};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

type AppStateArc = Arc<AppState>;

/// Content type for fix scripts
pub const SCRIPT_CONTENT_TYPE: &str = "text/x-shellscript; charset=utf-8";

/// Hint returned with a malformed feedback body
pub const FEEDBACK_HINT: &str = r#"Send {"success": true|false, "remainingIssues": <count>}"#;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub touches_config: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub stored_results: usize,
    pub store_capacity: usize,
    pub ledger_enabled: bool,
    pub issues: Vec<IssueStats>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub stored_results: usize,
}

#[derive(Debug, Deserialize)]
pub struct FixQuery {
    pub format: Option<String>,
}

/// `DoctorError` as an HTTP response; internal detail stays in the logs
pub struct ApiError(pub DoctorError);

impl From<DoctorError> for ApiError {
    fn from(e: DoctorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, hint) = match &self.0 {
            DoctorError::InvalidPayload { hint, .. } => (StatusCode::BAD_REQUEST, Some(hint.clone())),
            DoctorError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            DoctorError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
        };

        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
            hint,
        };
        (status, Json(body)).into_response()
    }
}

fn script_response(script: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, SCRIPT_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, "inline; filename=\"clawmedic-fix.sh\""),
        ],
        script,
    )
        .into_response()
}

// ============================================================================
// Diagnose Routes
// ============================================================================

pub fn diagnose_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/diagnose", post(diagnose))
}

/// Body is parsed by hand so malformed JSON gets the same error shape as a
/// payload without `system`
async fn diagnose(
    State(state): State<AppStateArc>,
    body: Bytes,
) -> Result<Json<AnalysisResult>, ApiError> {
    let raw: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("  Diagnose body is not JSON: {}", e);
        DoctorError::invalid_payload("body is not valid JSON")
    })?;

    let result = state.doctor.diagnose(raw).await?;
    Ok(Json(result))
}

// ============================================================================
// Fix Routes
// ============================================================================

pub fn fix_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/fix/:id", get(get_fix))
        .route("/v1/fix/:id/script", get(get_fix_script))
        .route("/v1/fix/:id/feedback", post(post_feedback))
}

async fn get_fix(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Query(query): Query<FixQuery>,
) -> Result<Response, ApiError> {
    let result = state.doctor.fetch(&id).await?;

    if query.format.as_deref() == Some("script") {
        return Ok(script_response(result.fix_script));
    }
    Ok(Json(result).into_response())
}

async fn get_fix_script(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let result = state.doctor.fetch(&id).await?;
    Ok(script_response(result.fix_script))
}

async fn post_feedback(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let feedback: Feedback = serde_json::from_slice(&body).map_err(|e| {
        warn!("  Feedback body for {} rejected: {}", id, e);
        DoctorError::InvalidPayload {
            reason: "feedback body is not valid".to_string(),
            hint: FEEDBACK_HINT.to_string(),
        }
    })?;

    state.doctor.record_feedback(&id, feedback).await?;
    info!("  Feedback accepted for {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Catalog Routes
// ============================================================================

pub fn catalog_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/catalog", get(list_catalog))
}

async fn list_catalog(State(state): State<AppStateArc>) -> Json<Vec<CatalogEntry>> {
    let entries = state
        .doctor
        .catalog()
        .iter()
        .map(|def| CatalogEntry {
            id: def.id.to_string(),
            severity: def.severity,
            title: def.title.to_string(),
            description: def.description.to_string(),
            touches_config: def.touches_config,
        })
        .collect();

    Json(entries)
}

// ============================================================================
// Stats Routes
// ============================================================================

pub fn stats_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/stats", get(get_stats))
}

async fn get_stats(State(state): State<AppStateArc>) -> Result<Json<StatsResponse>, ApiError> {
    let issues = state.doctor.issue_stats().await?;
    let store = state.doctor.store().read().await;

    Ok(Json(StatsResponse {
        stored_results: store.len(),
        store_capacity: store.capacity(),
        ledger_enabled: state.doctor.has_ledger(),
        issues,
    }))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    let stored_results = state.doctor.store().read().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        stored_results,
    })
}
