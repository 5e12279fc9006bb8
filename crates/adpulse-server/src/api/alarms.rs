use crate::api::pagination::{page_bounds, paginate};
use crate::api::{
    error_response, evaluation_error_response, storage_failure, success_response, PaginatedData,
};
use crate::logging::TraceId;
use crate::state::AppState;
use adpulse_alert::lifecycle::AlarmUpdate;
use adpulse_common::types::{Alarm, AlarmState, ResolutionMethod, Severity};
use adpulse_storage::{AlarmFilter, RecordStore};
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct AlarmListParams {
    #[param(required = false)]
    campaign_id: Option<String>,
    #[param(required = false)]
    monitor_id: Option<String>,
    /// active / resolved / dismissed
    #[param(required = false)]
    state: Option<String>,
    /// critical / high / medium / low
    #[param(required = false)]
    severity: Option<String>,
    /// Page size (default 50)
    #[param(required = false)]
    #[serde(
        default,
        deserialize_with = "crate::api::pagination::deserialize_optional_u64"
    )]
    limit: Option<u64>,
    #[param(required = false)]
    #[serde(
        default,
        deserialize_with = "crate::api::pagination::deserialize_optional_u64"
    )]
    offset: Option<u64>,
}

impl AlarmListParams {
    fn filter(&self) -> Result<AlarmFilter, String> {
        let state = match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<AlarmState>()?),
            None => None,
        };
        let severity = match self.severity.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<Severity>()?),
            None => None,
        };
        Ok(AlarmFilter {
            campaign_id: self.campaign_id.clone().filter(|s| !s.is_empty()),
            monitor_id: self.monitor_id.clone().filter(|s| !s.is_empty()),
            state,
            severity,
        })
    }
}

/// List alarms, most recently triggered first.
#[utoipa::path(
    get,
    path = "/v1/alarms",
    tag = "Alarms",
    params(AlarmListParams),
    responses(
        (status = 200, description = "Alarm page", body = PaginatedData<Alarm>),
        (status = 400, description = "Invalid filter", body = crate::api::ApiError)
    )
)]
async fn list_alarms(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<AlarmListParams>,
) -> impl IntoResponse {
    let filter = match params.filter() {
        Ok(f) => f,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg),
    };
    let (limit, offset) = page_bounds(params.limit, params.offset);

    match state.store.list_alarms(&filter) {
        Ok(alarms) => {
            let total = alarms.len() as u64;
            success_response(
                StatusCode::OK,
                &trace_id,
                PaginatedData {
                    items: paginate(alarms, limit, offset),
                    total,
                    limit,
                    offset,
                },
            )
        }
        Err(e) => storage_failure(&trace_id, &e, "list alarms"),
    }
}

/// Get one alarm, including insights once they are attached.
#[utoipa::path(
    get,
    path = "/v1/alarms/{id}",
    tag = "Alarms",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "Alarm", body = Alarm),
        (status = 404, description = "Alarm not found", body = crate::api::ApiError)
    )
)]
async fn get_alarm(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alarm(&id) {
        Ok(Some(alarm)) => success_response(StatusCode::OK, &trace_id, alarm),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alarm not found",
        ),
        Err(e) => storage_failure(&trace_id, &e, "load alarm"),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveAlarmRequest {
    /// Defaults to `user_action`.
    #[serde(default = "default_resolution_method")]
    pub method: ResolutionMethod,
}

fn default_resolution_method() -> ResolutionMethod {
    ResolutionMethod::UserAction
}

#[derive(Serialize, ToSchema)]
struct AlarmUpdateResponse {
    /// False when the alarm was already resolved or dismissed.
    changed: bool,
    alarm: Alarm,
}

impl From<AlarmUpdate> for AlarmUpdateResponse {
    fn from(update: AlarmUpdate) -> Self {
        Self {
            changed: update.changed(),
            alarm: update.into_alarm(),
        }
    }
}

/// Resolve an active alarm. The body is optional.
#[utoipa::path(
    post,
    path = "/v1/alarms/{id}/resolve",
    tag = "Alarms",
    params(("id" = String, Path, description = "Alarm id")),
    request_body(content = ResolveAlarmRequest, description = "Optional; defaults to user_action"),
    responses(
        (status = 200, description = "Alarm after the request", body = AlarmUpdateResponse),
        (status = 400, description = "Malformed body", body = crate::api::ApiError),
        (status = 404, description = "Alarm not found", body = crate::api::ApiError)
    )
)]
async fn resolve_alarm(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let method = if body.iter().all(u8::is_ascii_whitespace) {
        default_resolution_method()
    } else {
        match serde_json::from_slice::<Option<ResolveAlarmRequest>>(&body) {
            Ok(req) => req.map_or_else(default_resolution_method, |r| r.method),
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("Invalid body: {e}"),
                )
            }
        }
    };

    match state.engine.resolve_alarm(&id, method) {
        Ok(update) => success_response(StatusCode::OK, &trace_id, AlarmUpdateResponse::from(update)),
        Err(e) => evaluation_error_response(&trace_id, &e),
    }
}

/// Dismiss an active alarm.
#[utoipa::path(
    post,
    path = "/v1/alarms/{id}/dismiss",
    tag = "Alarms",
    params(("id" = String, Path, description = "Alarm id")),
    responses(
        (status = 200, description = "Alarm after the request", body = AlarmUpdateResponse),
        (status = 404, description = "Alarm not found", body = crate::api::ApiError)
    )
)]
async fn dismiss_alarm(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.dismiss_alarm(&id) {
        Ok(update) => success_response(StatusCode::OK, &trace_id, AlarmUpdateResponse::from(update)),
        Err(e) => evaluation_error_response(&trace_id, &e),
    }
}

pub fn alarm_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_alarms))
        .routes(routes!(get_alarm))
        .routes(routes!(resolve_alarm))
        .routes(routes!(dismiss_alarm))
}
