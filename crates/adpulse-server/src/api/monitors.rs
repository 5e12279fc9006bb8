use crate::api::{
    error_response, evaluation_error_response, find_campaign, find_monitor, storage_failure,
    success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use adpulse_alert::engine::MonitorOutcome;
use adpulse_common::types::{Monitor, Sensitivity};
use adpulse_storage::error::StorageError;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Evaluate one monitor now, regardless of its enabled flag.
#[utoipa::path(
    post,
    path = "/v1/monitors/{id}/evaluate",
    tag = "Monitors",
    params(("id" = String, Path, description = "Monitor id")),
    responses(
        (status = 200, description = "New state and alarm changes", body = MonitorOutcome),
        (status = 404, description = "Monitor not found", body = crate::api::ApiError),
        (status = 422, description = "Monitor configuration cannot be evaluated", body = crate::api::ApiError),
        (status = 503, description = "Metric source unavailable", body = crate::api::ApiError)
    )
)]
async fn evaluate_monitor(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let monitor = match find_monitor(&state, &trace_id, &id) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let campaign = match find_campaign(&state, &trace_id, &monitor.campaign_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match state.engine.evaluate_monitor(&monitor, &campaign) {
        Ok(outcome) => success_response(StatusCode::OK, &trace_id, outcome),
        Err(e) => evaluation_error_response(&trace_id, &e),
    }
}

/// Monitor settings that may change after creation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMonitorRequest {
    pub enabled: Option<bool>,
    pub sensitivity: Option<Sensitivity>,
}

#[derive(Serialize, ToSchema)]
struct UpdateMonitorResponse {
    monitor: Monitor,
    /// Present when the update enabled the monitor and it was evaluated.
    evaluation: Option<MonitorOutcome>,
    /// Why the follow-up evaluation failed, if it did.
    evaluation_error: Option<String>,
}

/// Enable/disable a monitor or change its sensitivity.
///
/// Enabling a disabled monitor evaluates it immediately.
#[utoipa::path(
    put,
    path = "/v1/monitors/{id}",
    tag = "Monitors",
    params(("id" = String, Path, description = "Monitor id")),
    request_body = UpdateMonitorRequest,
    responses(
        (status = 200, description = "Updated monitor", body = UpdateMonitorResponse),
        (status = 400, description = "Nothing to update", body = crate::api::ApiError),
        (status = 404, description = "Monitor not found", body = crate::api::ApiError)
    )
)]
async fn update_monitor(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMonitorRequest>,
) -> impl IntoResponse {
    if body.enabled.is_none() && body.sensitivity.is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "Provide enabled and/or sensitivity",
        );
    }

    let mut newly_enabled = false;
    let updated = state.store.update_monitor(&id, |monitor| {
        let now = Utc::now();
        if let Some(enabled) = body.enabled {
            newly_enabled = enabled && !monitor.enabled;
            monitor.set_enabled(enabled, now);
        }
        if let Some(sensitivity) = body.sensitivity {
            monitor.set_sensitivity(sensitivity, now);
        }
    });
    let monitor = match updated {
        Ok(m) => m,
        Err(StorageError::NotFound { .. }) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Monitor not found",
            )
        }
        Err(e) => return storage_failure(&trace_id, &e, "update monitor"),
    };
    tracing::info!(
        monitor_id = %monitor.id,
        enabled = monitor.enabled,
        sensitivity = %monitor.sensitivity,
        "Monitor updated"
    );

    let mut evaluation = None;
    let mut evaluation_error = None;
    if newly_enabled {
        let campaign = match find_campaign(&state, &trace_id, &monitor.campaign_id) {
            Ok(c) => c,
            Err(resp) => return resp,
        };
        match state.engine.evaluate_monitor(&monitor, &campaign) {
            Ok(outcome) => evaluation = Some(outcome),
            Err(e) => {
                tracing::warn!(monitor_id = %monitor.id, error = %e, "Evaluation after enable failed");
                evaluation_error = Some(e.to_string());
            }
        }
    }

    success_response(
        StatusCode::OK,
        &trace_id,
        UpdateMonitorResponse {
            monitor,
            evaluation,
            evaluation_error,
        },
    )
}

pub fn monitor_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(update_monitor))
        .routes(routes!(evaluate_monitor))
}
