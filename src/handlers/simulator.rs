//! Local stand-ins for the JSON and SOAP gateway backends, for running the
//! service without real providers.

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::gateway::soap::Envelope;
use crate::gateway::SoapResponse;
use crate::utils::sanitize::sanitize_json;

pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/simulator/json/:operation", post(json_gateway))
        .route("/simulator/soap/:operation", post(soap_gateway))
}

pub async fn json_gateway(Path(operation): Path<String>, body: Bytes) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": "invalid JSON payload"})),
            )
                .into_response()
        }
    };

    tracing::info!(operation = %operation, request = %sanitize_json(&payload), "Simulated JSON gateway request");

    Json(json!({
        "status": "success",
        "message": format!("Mock JSON gateway processed the {} successfully", operation),
    }))
    .into_response()
}

#[derive(Serialize)]
struct SimulatedBody {
    #[serde(rename = "Response")]
    response: SoapResponse,
}

pub async fn soap_gateway(Path(operation): Path<String>, body: Bytes) -> Response {
    if body.is_empty() || std::str::from_utf8(&body).is_err() {
        return (StatusCode::BAD_REQUEST, "invalid SOAP payload").into_response();
    }

    tracing::info!(operation = %operation, bytes = body.len(), "Simulated SOAP gateway request");

    let envelope = Envelope {
        body: SimulatedBody {
            response: SoapResponse {
                result: None,
                status: Some("success".to_string()),
                message: Some(format!(
                    "Mock SOAP gateway processed the {} successfully",
                    operation
                )),
            },
        },
    };

    match quick_xml::se::to_string(&envelope) {
        Ok(xml) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], xml).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
