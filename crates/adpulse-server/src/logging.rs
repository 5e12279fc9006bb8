use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

pub const TRACE_HEADER: &str = "X-Trace-Id";

/// Trace id of the current request, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 16 hex characters from 8 random bytes.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Reuses a caller-supplied trace id when it is short and printable.
fn incoming_trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .filter(|v| v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .map(str::to_string)
}

const MAX_BODY_LOG_CHARS: usize = 200;
/// Same as axum's default extractor limit, so oversized bodies are answered
/// here with the API envelope.
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Body preview for logs, cut at a char boundary.
fn body_preview(bytes: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "<non-utf8 body>".to_string();
    };
    if text.len() <= MAX_BODY_LOG_CHARS {
        return text.to_string();
    }
    let mut end = MAX_BODY_LOG_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn format_elapsed(elapsed_us: u128) -> String {
    match elapsed_us {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        us => format!("{:.1}s", us as f64 / 1_000_000.0),
    }
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, body: &str) {
    let status = status.as_u16();
    match status {
        s if s >= 500 => tracing::error!(trace_id, status, elapsed, body, "<-- response"),
        s if s >= 400 => tracing::warn!(trace_id, status, elapsed, body, "<-- response"),
        _ => tracing::info!(trace_id, status, elapsed, "<-- response"),
    }
}

/// Logs one line per request and per response and tags the response with
/// [`TRACE_HEADER`].
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = incoming_trace_id(req.headers()).unwrap_or_else(generate_trace_id);
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let req = if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    trace_id = %trace_id,
                    method = %method,
                    path = %url,
                    error = %e,
                    limit = MAX_REQUEST_BODY_BYTES,
                    "--> request body rejected"
                );
                let mut response = crate::api::error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &trace_id,
                    "payload_too_large",
                    &format!("Request body exceeds {MAX_REQUEST_BODY_BYTES} bytes"),
                );
                if let Ok(val) = HeaderValue::from_str(&trace_id) {
                    response.headers_mut().insert(TRACE_HEADER, val);
                }
                return response;
            }
        };
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            body = %body_preview(&bytes),
            "--> request"
        );
        Request::from_parts(parts, Body::from(bytes))
    } else {
        tracing::info!(trace_id = %trace_id, method = %method, path = %url, "--> request");
        req
    };

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());

    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    // OpenAPI document bodies are not logged
    let preview = if is_json && !url.starts_with("/v1/openapi") {
        body_preview(&bytes)
    } else {
        String::new()
    };
    log_response(&trace_id, parts.status, &elapsed, &preview);

    let mut response = Response::from_parts(parts, Body::from(bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, val);
    }
    response
}
