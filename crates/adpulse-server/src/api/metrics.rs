use crate::api::{error_response, storage_failure, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use adpulse_common::types::MetricSample;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Keeps a full batch well inside the request body limit.
const MAX_BATCH: usize = 5_000;

#[derive(Serialize, ToSchema)]
struct IngestResponse {
    accepted: usize,
}

fn validate(sample: &MetricSample) -> Result<(), String> {
    if sample.campaign_id.trim().is_empty() || sample.metric_id.trim().is_empty() {
        return Err("campaign_id and metric_id are required".to_string());
    }
    if !sample.value.is_finite() || !sample.expected.is_finite() {
        return Err(format!(
            "non-finite value for {}/{}",
            sample.campaign_id, sample.metric_id
        ));
    }
    match (&sample.dimension, &sample.dimension_value) {
        (Some(d), Some(v)) if !d.is_empty() && !v.is_empty() => Ok(()),
        (None, None) => Ok(()),
        _ => Err("dimension and dimension_value must be set together".to_string()),
    }
}

/// Ingest metric samples. Aggregate samples omit `dimension`.
#[utoipa::path(
    post,
    path = "/v1/metrics",
    tag = "Metrics",
    request_body = Vec<MetricSample>,
    responses(
        (status = 200, description = "Samples stored", body = IngestResponse),
        (status = 400, description = "Invalid sample", body = crate::api::ApiError)
    )
)]
async fn ingest_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(samples): Json<Vec<MetricSample>>,
) -> impl IntoResponse {
    if samples.is_empty() || samples.len() > MAX_BATCH {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            &format!("Batch must contain 1..={MAX_BATCH} samples"),
        );
    }
    if let Some(msg) = samples.iter().find_map(|s| validate(s).err()) {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg);
    }

    match state.store.write_samples(&samples) {
        Ok(accepted) => {
            tracing::debug!(accepted, "Metric samples ingested");
            success_response(StatusCode::OK, &trace_id, IngestResponse { accepted })
        }
        Err(e) => storage_failure(&trace_id, &e, "write metric samples"),
    }
}

pub fn metric_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(ingest_metrics))
}
