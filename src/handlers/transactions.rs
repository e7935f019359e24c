use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PaymentRequest, Transaction, TransactionType};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct TransactionRequest {
    pub account_id: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TransactionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
}

pub async fn deposit(State(state): State<AppState>, body: Bytes) -> Response {
    process(&state, TransactionType::Deposit, &body).await
}

pub async fn withdrawal(State(state): State<AppState>, body: Bytes) -> Response {
    process(&state, TransactionType::Withdrawal, &body).await
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    state
        .transactions
        .get_transaction(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
}

async fn process(state: &AppState, kind: TransactionType, body: &[u8]) -> Response {
    let request: TransactionRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Rejected malformed transaction request");
            return respond(StatusCode::BAD_REQUEST, false, "Invalid request payload".to_string(), None);
        }
    };

    let payment = PaymentRequest::new(request.account_id, request.amount);
    let result = match kind {
        TransactionType::Deposit => state.transactions.create_and_process_deposit(payment).await,
        TransactionType::Withdrawal => {
            state.transactions.create_and_process_withdrawal(payment).await
        }
    };

    match result {
        Ok(tx) => respond(
            StatusCode::OK,
            true,
            format!("{} {} processed successfully", kind_label(kind), tx.id),
            Some(tx.id),
        ),
        Err(e) if e.error.is_internal() => {
            tracing::error!(kind = %kind, error = %e, "Transaction processing failed internally");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Internal server error".to_string(),
                e.transaction.map(|tx| tx.id),
            )
        }
        Err(e) => respond(
            StatusCode::BAD_REQUEST,
            false,
            e.to_string(),
            e.transaction.map(|tx| tx.id),
        ),
    }
}

fn kind_label(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Deposit => "Deposit",
        TransactionType::Withdrawal => "Withdrawal",
    }
}

fn respond(status: StatusCode, success: bool, message: String, transaction_id: Option<Uuid>) -> Response {
    let body = TransactionResponse {
        success,
        message: Some(message),
        transaction_id,
    };
    (status, Json(body)).into_response()
}
