pub mod alarms;
pub mod campaigns;
pub mod metrics;
pub mod monitors;
pub mod pagination;

use crate::logging::TraceId;
use crate::state::AppState;
use adpulse_alert::error::EvaluationError;
use adpulse_common::types::{Campaign, Monitor};
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Error envelope.
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

/// Response envelope shared by every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// `0` on success.
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "payload_too_large" => 1013,
        "internal_error" => 1500,
        "storage_error" => 1501,
        "evaluation_failed" => 1601,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// Logs a store failure and answers 500.
pub fn storage_failure(trace_id: &str, error: &dyn std::fmt::Display, what: &str) -> Response {
    tracing::error!(trace_id, error = %error, "Failed to {what}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        "Database error",
    )
}

pub fn evaluation_error_response(trace_id: &str, error: &EvaluationError) -> Response {
    match error {
        EvaluationError::AlarmNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", "Alarm not found")
        }
        EvaluationError::Storage(e) => storage_failure(trace_id, e, "access record store"),
        EvaluationError::MetricSource { .. } => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            trace_id,
            "evaluation_failed",
            &error.to_string(),
        ),
        EvaluationError::InvalidConfig { .. } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            trace_id,
            "evaluation_failed",
            &error.to_string(),
        ),
    }
}

/// Loads a campaign or builds the 404/500 response.
pub(crate) fn find_campaign(
    state: &AppState,
    trace_id: &str,
    id: &str,
) -> Result<Campaign, Response> {
    match state.store.get_campaign(id) {
        Ok(Some(campaign)) => Ok(campaign),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "Campaign not found",
        )),
        Err(e) => Err(storage_failure(trace_id, &e, "load campaign")),
    }
}

pub(crate) fn find_monitor(state: &AppState, trace_id: &str, id: &str) -> Result<Monitor, Response> {
    match state.store.get_monitor(id) {
        Ok(Some(monitor)) => Ok(monitor),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "Monitor not found",
        )),
        Err(e) => Err(storage_failure(trace_id, &e, "load monitor")),
    }
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    campaign_count: usize,
    /// `ok` or `error`
    storage_status: String,
    insights_provider: String,
}

/// Service health.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    let (campaign_count, storage_status) = match state.store.list_campaigns() {
        Ok(campaigns) => (campaigns.len(), "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not read campaigns");
            (0, "error")
        }
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            campaign_count,
            storage_status: storage_status.to_string(),
            insights_provider: state.config.insights.provider.clone(),
        },
    )
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .merge(metrics::metric_routes())
        .merge(campaigns::campaign_routes())
        .merge(monitors::monitor_routes())
        .merge(alarms::alarm_routes())
}
