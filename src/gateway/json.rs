//! JSON-over-HTTP gateway.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Serialize, Serializer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

use super::{
    CircuitState, GatewayDescriptor, GatewayError, GatewayResponse, Operation, PaymentGateway,
    ResilientClient,
};
use crate::domain::{CallbackRequest, PaymentRequest};
use crate::utils::sanitize::sanitize_json;

const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Serialize)]
struct JsonPaymentRequest<'a> {
    account: &'a str,
    #[serde(serialize_with = "amount_as_number")]
    amount: &'a BigDecimal,
}

/// Gateways expect a JSON number; bigdecimal's serde impl writes a string.
fn amount_as_number<S: Serializer>(amount: &&BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    let number = serde_json::Number::from_str(&amount.to_string()).map_err(serde::ser::Error::custom)?;
    number.serialize(serializer)
}

#[derive(Clone)]
pub struct JsonGateway {
    name: String,
    client: ResilientClient,
}

impl JsonGateway {
    pub fn new(descriptor: &GatewayDescriptor) -> Result<Self, GatewayError> {
        let client = ResilientClient::new(&descriptor.name, &descriptor.base_url, &descriptor.resilience)?;
        Ok(Self {
            name: descriptor.name.clone(),
            client,
        })
    }

    /// Registry constructor.
    pub fn build(descriptor: &GatewayDescriptor) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        Ok(Arc::new(Self::new(descriptor)?))
    }

    async fn submit(
        &self,
        operation: Operation,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        let payload = JsonPaymentRequest {
            account: &request.account,
            amount: &request.amount,
        };
        let body = serde_json::to_vec(&payload).map_err(|e| GatewayError::RequestEncode {
            gateway: self.name.clone(),
            reason: e.to_string(),
        })?;

        let bytes = self
            .client
            .post(operation.path(), CONTENT_TYPE, body, deadline)
            .await?;

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| GatewayError::ResponseDecode {
                gateway: self.name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            gateway = %self.name,
            operation = operation.as_str(),
            response = %sanitize_json(&value),
            "Gateway call succeeded"
        );

        Ok(GatewayResponse::Json(value))
    }
}

#[async_trait]
impl PaymentGateway for JsonGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        "json"
    }

    fn circuit_state(&self) -> CircuitState {
        self.client.circuit_state()
    }

    async fn process_deposit(
        &self,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        self.submit(Operation::Deposit, request, deadline).await
    }

    async fn process_withdrawal(
        &self,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        self.submit(Operation::Withdrawal, request, deadline).await
    }

    async fn handle_callback(
        &self,
        callback: &CallbackRequest,
        _deadline: Instant,
    ) -> Result<(), GatewayError> {
        tracing::debug!(
            gateway = %self.name,
            transaction_id = %callback.transaction_id,
            "JSON gateways need no callback acknowledgement"
        );
        Ok(())
    }
}
