use crate::api::{find_campaign, storage_failure, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use adpulse_alert::engine::CampaignEvaluation;
use adpulse_common::types::{AlarmSummary, Campaign, Monitor, MonitorState};
use adpulse_storage::RecordStore;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use utoipa_axum::{router::OpenApiRouter, routes};

/// List campaigns with monitoring enabled.
#[utoipa::path(
    get,
    path = "/v1/campaigns",
    tag = "Campaigns",
    responses(
        (status = 200, description = "Campaigns", body = Vec<Campaign>)
    )
)]
async fn list_campaigns(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.list_campaigns() {
        Ok(campaigns) => success_response(StatusCode::OK, &trace_id, campaigns),
        Err(e) => storage_failure(&trace_id, &e, "list campaigns"),
    }
}

/// List the monitors of a campaign.
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}/monitors",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Monitors of the campaign", body = Vec<Monitor>),
        (status = 404, description = "Campaign not found", body = crate::api::ApiError)
    )
)]
async fn list_campaign_monitors(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = find_campaign(&state, &trace_id, &id) {
        return resp;
    }
    match state.store.list_monitors(&id) {
        Ok(monitors) => success_response(StatusCode::OK, &trace_id, monitors),
        Err(e) => storage_failure(&trace_id, &e, "list monitors"),
    }
}

/// Evaluate every enabled monitor of a campaign.
///
/// Monitors that cannot be evaluated are listed in `failures`; the request
/// still succeeds.
#[utoipa::path(
    post,
    path = "/v1/campaigns/{id}/evaluate",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Evaluation result, possibly partial", body = CampaignEvaluation),
        (status = 404, description = "Campaign not found", body = crate::api::ApiError)
    )
)]
async fn evaluate_campaign(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let campaign = match find_campaign(&state, &trace_id, &id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let monitors = match state.store.list_monitors(&id) {
        Ok(m) => m,
        Err(e) => return storage_failure(&trace_id, &e, "list monitors"),
    };

    let result = state.engine.evaluate_all(&campaign, &monitors);
    success_response(StatusCode::OK, &trace_id, result)
}

/// Latest state of every evaluated monitor of a campaign.
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}/states",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Monitor states", body = Vec<MonitorState>),
        (status = 404, description = "Campaign not found", body = crate::api::ApiError)
    )
)]
async fn campaign_states(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = find_campaign(&state, &trace_id, &id) {
        return resp;
    }
    match state.store.list_monitor_states(&id) {
        Ok(states) => success_response(StatusCode::OK, &trace_id, states),
        Err(e) => storage_failure(&trace_id, &e, "list monitor states"),
    }
}

/// Active alarm counts by severity and the number of healthy monitors.
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}/alarms/summary",
    tag = "Campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Alarm summary", body = AlarmSummary),
        (status = 404, description = "Campaign not found", body = crate::api::ApiError)
    )
)]
async fn campaign_alarm_summary(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(resp) = find_campaign(&state, &trace_id, &id) {
        return resp;
    }
    let monitor_count = match state.store.list_monitors(&id) {
        Ok(m) => m.len(),
        Err(e) => return storage_failure(&trace_id, &e, "list monitors"),
    };
    match state.engine.campaign_summary(&id, monitor_count) {
        Ok(summary) => success_response(StatusCode::OK, &trace_id, summary),
        Err(e) => crate::api::evaluation_error_response(&trace_id, &e),
    }
}

pub fn campaign_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_campaigns))
        .routes(routes!(list_campaign_monitors))
        .routes(routes!(evaluate_campaign))
        .routes(routes!(campaign_states))
        .routes(routes!(campaign_alarm_summary))
}
