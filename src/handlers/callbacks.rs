use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::domain::CallbackResponse;
use crate::error::AppError;
use crate::services::{CallbackError, CallbackFormat};
use crate::AppState;

/// Receives a gateway callback in that gateway's wire format and answers in kind.
pub async fn handle_callback(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    body: Bytes,
) -> Response {
    let Some(service) = state.callbacks.get(&gateway) else {
        return AppError::NotFound(format!("Unknown gateway {}", gateway)).into_response();
    };
    let format = service.format();

    match service.handle_payload(&body).await {
        Ok(response) => render(format, StatusCode::OK, &response),
        Err(e) => {
            let status = status_for(&e);
            let message = if status.is_server_error() {
                tracing::error!(gateway = %gateway, error = %e, "Callback processing failed");
                "Internal server error".to_string()
            } else {
                tracing::warn!(gateway = %gateway, error = %e, "Callback rejected");
                e.to_string()
            };
            render(format, status, &CallbackResponse::error(message))
        }
    }
}

fn status_for(error: &CallbackError) -> StatusCode {
    match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        CallbackError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
        CallbackError::StatusConflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn render(format: CallbackFormat, status: StatusCode, response: &CallbackResponse) -> Response {
    match format.encode(response) {
        Ok(body) => (status, [(header::CONTENT_TYPE, format.content_type())], body).into_response(),
        Err(e) => AppError::Internal(e.to_string()).into_response(),
    }
}
