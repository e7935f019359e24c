//! Reconciles asynchronous gateway callbacks into transaction status changes.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::cache::ExpiringCache;
use crate::domain::{CallbackRequest, CallbackResponse, TransactionStatus};
use crate::gateway::PaymentGateway;
use crate::ports::RepositoryError;
use crate::services::transaction_service::TransactionService;

const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("invalid callback: missing required fields")]
    MissingRequiredFields,

    #[error("invalid transaction: missing amount")]
    MissingAmount,

    #[error("invalid transaction: missing currency")]
    MissingCurrency,

    #[error("invalid callback: unknown status '{0}'")]
    InvalidStatus(String),

    #[error("invalid callback payload: {0}")]
    MalformedPayload(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("transaction status conflict: {0}")]
    StatusConflict(String),

    #[error("failed to update transaction status: {0}")]
    UpdateFailed(RepositoryError),

    #[error("failed to encode callback response: {0}")]
    Encode(String),
}

impl CallbackError {
    /// Rejections caused by the payload itself.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CallbackError::MissingRequiredFields
                | CallbackError::MissingAmount
                | CallbackError::MissingCurrency
                | CallbackError::InvalidStatus(_)
                | CallbackError::MalformedPayload(_)
        )
    }
}

/// Wire format of a gateway's callbacks, chosen by the gateway's protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFormat {
    Json,
    Xml,
}

impl CallbackFormat {
    pub fn for_protocol(protocol: &str) -> Self {
        match protocol.to_ascii_lowercase().as_str() {
            "soap" | "xml" => CallbackFormat::Xml,
            _ => CallbackFormat::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            CallbackFormat::Json => "application/json",
            CallbackFormat::Xml => "application/xml",
        }
    }

    pub fn decode(&self, body: &[u8]) -> Result<CallbackRequest, CallbackError> {
        match self {
            CallbackFormat::Json => serde_json::from_slice(body)
                .map_err(|e| CallbackError::MalformedPayload(e.to_string())),
            CallbackFormat::Xml => {
                let raw = std::str::from_utf8(body)
                    .map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;
                let xml: XmlCallbackRequest = quick_xml::de::from_str(raw)
                    .map_err(|e| CallbackError::MalformedPayload(e.to_string()))?;
                Ok(xml.into())
            }
        }
    }

    pub fn encode(&self, response: &CallbackResponse) -> Result<Vec<u8>, CallbackError> {
        match self {
            CallbackFormat::Json => {
                serde_json::to_vec(response).map_err(|e| CallbackError::Encode(e.to_string()))
            }
            CallbackFormat::Xml => {
                let xml = XmlCallbackResponse {
                    status: response.status.clone(),
                    message: response.message.clone(),
                };
                quick_xml::se::to_string(&xml)
                    .map(String::into_bytes)
                    .map_err(|e| CallbackError::Encode(e.to_string()))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "CallbackRequest")]
struct XmlCallbackRequest {
    #[serde(rename = "TransactionID", default)]
    transaction_id: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "GatewayRef", default)]
    gateway_ref: String,
    // decimal text; bigdecimal's own deserializer does not accept element content
    #[serde(rename = "Amount", default)]
    amount: Option<String>,
    #[serde(rename = "Currency", default)]
    currency: String,
    #[serde(rename = "Timestamp", default)]
    timestamp: String,
    #[serde(rename = "Metadata", default)]
    metadata: Option<HashMap<String, String>>,
}

impl From<XmlCallbackRequest> for CallbackRequest {
    fn from(xml: XmlCallbackRequest) -> Self {
        CallbackRequest {
            transaction_id: xml.transaction_id,
            status: xml.status,
            gateway_ref: xml.gateway_ref,
            // unparseable amounts are treated as missing and rejected by validation
            amount: xml
                .amount
                .and_then(|raw| BigDecimal::from_str(raw.trim()).ok()),
            currency: xml.currency,
            timestamp: xml.timestamp,
            metadata: xml
                .metadata
                .map(|m| serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "CallbackResponse")]
struct XmlCallbackResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Message")]
    message: String,
}

/// Checks a callback and returns the status it asks for.
pub fn validate_callback(request: &CallbackRequest) -> Result<TransactionStatus, CallbackError> {
    if request.transaction_id.trim().is_empty() || request.gateway_ref.trim().is_empty() {
        return Err(CallbackError::MissingRequiredFields);
    }
    match &request.amount {
        Some(amount) if amount > &BigDecimal::from(0) => {}
        _ => return Err(CallbackError::MissingAmount),
    }
    if request.currency.trim().is_empty() {
        return Err(CallbackError::MissingCurrency);
    }
    request
        .status
        .parse()
        .map_err(|_| CallbackError::InvalidStatus(request.status.clone()))
}

pub fn dedup_key(gateway: &str, transaction_id: &str, gateway_ref: &str) -> String {
    format!("callback:{gateway}:{transaction_id}:{gateway_ref}")
}

/// One instance per configured gateway.
pub struct CallbackService {
    gateway: String,
    format: CallbackFormat,
    transactions: Arc<TransactionService>,
    cache: Arc<ExpiringCache<CallbackResponse>>,
    acknowledger: Option<Arc<dyn PaymentGateway>>,
}

impl CallbackService {
    pub fn new(
        gateway: impl Into<String>,
        format: CallbackFormat,
        transactions: Arc<TransactionService>,
        cache: Arc<ExpiringCache<CallbackResponse>>,
    ) -> Self {
        Self {
            gateway: gateway.into(),
            format,
            transactions,
            cache,
            acknowledger: None,
        }
    }

    /// Gateway notified after each reconciled callback.
    pub fn with_acknowledger(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.acknowledger = Some(gateway);
        self
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn format(&self) -> CallbackFormat {
        self.format
    }

    pub async fn handle_payload(&self, body: &[u8]) -> Result<CallbackResponse, CallbackError> {
        let request = self.format.decode(body)?;
        self.handle_callback(request).await
    }

    pub async fn handle_callback(
        &self,
        request: CallbackRequest,
    ) -> Result<CallbackResponse, CallbackError> {
        let status = validate_callback(&request)?;

        let key = dedup_key(&self.gateway, &request.transaction_id, &request.gateway_ref);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::info!(
                gateway = %self.gateway,
                transaction_id = %request.transaction_id,
                gateway_ref = %request.gateway_ref,
                "Duplicate callback, replaying cached response"
            );
            return Ok(cached);
        }

        // ids are only ever issued as UUIDs, so anything else cannot exist
        let id = Uuid::parse_str(request.transaction_id.trim())
            .map_err(|_| CallbackError::TransactionNotFound(request.transaction_id.clone()))?;

        self.transactions
            .update_status(id, status)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(missing) => CallbackError::TransactionNotFound(missing.to_string()),
                conflict @ RepositoryError::InvalidTransition { .. } => {
                    CallbackError::StatusConflict(conflict.to_string())
                }
                other => CallbackError::UpdateFailed(other),
            })?;

        let response = CallbackResponse::success(format!(
            "{} callback processed for transaction: {}, ref: {}",
            self.gateway, request.transaction_id, request.gateway_ref
        ));
        self.cache.set(key, response.clone()).await;

        tracing::info!(
            gateway = %self.gateway,
            transaction_id = %id,
            gateway_ref = %request.gateway_ref,
            status = %status,
            "Callback processed"
        );

        self.acknowledge(&request).await;
        Ok(response)
    }

    async fn acknowledge(&self, request: &CallbackRequest) {
        let Some(gateway) = &self.acknowledger else {
            return;
        };
        if let Err(e) = gateway
            .handle_callback(request, Instant::now() + ACK_TIMEOUT)
            .await
        {
            tracing::warn!(
                gateway = %self.gateway,
                transaction_id = %request.transaction_id,
                error = %e,
                "Callback acknowledgement failed"
            );
        }
    }
}
