use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

const MAX_BODY_LOG_SIZE: usize = 1024 * 64;
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Tags each request with a request id and a trace id, echoed back in
/// `x-request-id` / `x-trace-id`, and runs the handler inside a span carrying
/// both so gateway and callback logs correlate.
pub async fn request_logger_middleware(mut req: Request, next: Next) -> Response {
    let request_id = header_or_new(req.headers(), REQUEST_ID_HEADER);
    let trace_id = header_or_new(req.headers(), TRACE_ID_HEADER);
    let echoed: Vec<(&'static str, HeaderValue)> = [
        (REQUEST_ID_HEADER, &request_id),
        (TRACE_ID_HEADER, &trace_id),
    ]
    .into_iter()
    .filter_map(|(name, id)| HeaderValue::from_str(id).ok().map(|value| (name, value)))
    .collect();
    for (name, value) in &echoed {
        req.headers_mut().insert(*name, value.clone());
    }

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();

    let response = async move {
        let req = if body_logging_enabled() {
            match capture_body(req).await {
                Ok(req) => req,
                Err(response) => return response,
            }
        } else {
            tracing::info!("Incoming request");
            req
        };

        let response = next.run(req).await;
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Outgoing response"
        );
        response
    }
    .instrument(span)
    .await;

    let (mut parts, body) = response.into_parts();
    for (name, value) in echoed {
        parts.headers.insert(name, value);
    }
    Response::from_parts(parts, body)
}

/// The caller's id when it sent one, otherwise a fresh UUID.
fn header_or_new(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn body_logging_enabled() -> bool {
    std::env::var("LOG_REQUEST_BODY")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

/// Buffers the body for a sanitized log line and hands back an equivalent request.
async fn capture_body(req: Request) -> Result<Request, Response> {
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_LOG_SIZE).await {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!("Request body too large or failed to read");
            return Err((StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
        }
    };

    // account numbers and similar fields are masked before logging
    let logged = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(json) => crate::utils::sanitize::sanitize_json(&json).to_string(),
        Err(_) => format!("[non-json, {} bytes]", bytes.len()),
    };
    tracing::info!(body_size = bytes.len(), body = %logged, "Incoming request");

    Ok(Request::from_parts(parts, Body::from(bytes)))
}
