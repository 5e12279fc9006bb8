use crate::state::AppState;
use crate::{api, logging, openapi};
use axum::http::HeaderValue;
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "adpulse API",
        description = "Campaign metric monitoring and alarm management",
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Metrics", description = "Metric sample ingestion"),
        (name = "Campaigns", description = "Campaigns, monitor states and on-demand evaluation"),
        (name = "Monitors", description = "Monitor settings and single-monitor evaluation"),
        (name = "Alarms", description = "Alarm history and lifecycle")
    )
)]
struct ApiDoc;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn build_http_app(state: AppState) -> Router {
    let (router, api_doc) = api::routes().split_for_parts();

    let mut merged_doc = ApiDoc::openapi();
    merged_doc.merge(api_doc);

    let cors = cors_layer(&state.config.cors_allowed_origins);

    router
        .with_state(state)
        .merge(openapi::json_route(Arc::new(merged_doc)))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
