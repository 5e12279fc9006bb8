use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::OpenApi;

/// Serves the merged OpenAPI document at `/v1/openapi.json`.
pub fn json_route(doc: Arc<OpenApi>) -> Router {
    Router::new().route(
        "/v1/openapi.json",
        get(move || {
            let doc = doc.clone();
            async move { openapi_json(doc) }
        }),
    )
}

fn openapi_json(doc: Arc<OpenApi>) -> axum::response::Response {
    match doc.to_json() {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize OpenAPI document: {e}"),
        )
            .into_response(),
    }
}
