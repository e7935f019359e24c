//! SOAP/XML-over-HTTP gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use super::{
    CircuitState, GatewayDescriptor, GatewayError, GatewayResponse, Operation, PaymentGateway,
    ResilientClient,
};
use crate::domain::{CallbackRequest, PaymentRequest};

const CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const CALLBACK_ACK_PATH: &str = "/callback-ack";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Envelope")]
pub struct Envelope<B> {
    #[serde(rename = "Body")]
    pub body: B,
}

#[derive(Debug, Serialize)]
struct RequestBody {
    #[serde(rename = "DepositRequest", skip_serializing_if = "Option::is_none")]
    deposit: Option<SoapPaymentRequest>,
    #[serde(rename = "WithdrawalRequest", skip_serializing_if = "Option::is_none")]
    withdrawal: Option<SoapPaymentRequest>,
}

#[derive(Debug, Serialize)]
struct SoapPaymentRequest {
    #[serde(rename = "Account")]
    account: String,
    #[serde(rename = "Amount")]
    amount: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
    #[serde(rename = "DepositResponse", default)]
    deposit: Option<SoapResponse>,
    #[serde(rename = "WithdrawalResponse", default)]
    withdrawal: Option<SoapResponse>,
    #[serde(rename = "Response", default)]
    generic: Option<SoapResponse>,
}

/// Result element of a SOAP response. Backends answer either with a
/// `Result` or with a `Status`/`Message` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapResponse {
    #[serde(rename = "Result", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "Message", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct AckBody {
    #[serde(rename = "CallbackAck")]
    ack: CallbackAck,
}

#[derive(Debug, Serialize)]
struct CallbackAck {
    #[serde(rename = "TransactionID")]
    transaction_id: String,
    #[serde(rename = "GatewayRef")]
    gateway_ref: String,
    #[serde(rename = "Status")]
    status: String,
}

pub fn encode_payment_request(
    operation: Operation,
    request: &PaymentRequest,
) -> Result<String, quick_xml::de::DeError> {
    let element = SoapPaymentRequest {
        account: request.account.clone(),
        amount: request.amount.to_string(),
    };
    let body = match operation {
        Operation::Deposit => RequestBody {
            deposit: Some(element),
            withdrawal: None,
        },
        Operation::Withdrawal => RequestBody {
            deposit: None,
            withdrawal: Some(element),
        },
    };
    quick_xml::se::to_string(&Envelope { body })
}

pub fn decode_response(raw: &str) -> Result<SoapResponse, String> {
    let envelope: Envelope<ResponseBody> =
        quick_xml::de::from_str(raw).map_err(|e| e.to_string())?;
    let body = envelope.body;
    body.deposit
        .or(body.withdrawal)
        .or(body.generic)
        .ok_or_else(|| "SOAP body carries no response element".to_string())
}

#[derive(Clone)]
pub struct SoapGateway {
    name: String,
    client: ResilientClient,
}

impl SoapGateway {
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

    fn encode_error(&self, reason: impl ToString) -> GatewayError {
        GatewayError::RequestEncode {
            gateway: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    async fn submit(
        &self,
        operation: Operation,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        let body = encode_payment_request(operation, request).map_err(|e| self.encode_error(e))?;

        let bytes = self
            .client
            .post(operation.path(), CONTENT_TYPE, body.into_bytes(), deadline)
            .await?;

        let raw = String::from_utf8_lossy(&bytes);
        let response = decode_response(&raw).map_err(|reason| GatewayError::ResponseDecode {
            gateway: self.name.clone(),
            reason,
        })?;

        tracing::info!(
            gateway = %self.name,
            operation = operation.as_str(),
            result = ?response.result,
            status = ?response.status,
            "Gateway call succeeded"
        );

        Ok(GatewayResponse::Soap(response))
    }
}

#[async_trait]
impl PaymentGateway for SoapGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        "soap"
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
        deadline: Instant,
    ) -> Result<(), GatewayError> {
        let envelope = Envelope {
            body: AckBody {
                ack: CallbackAck {
                    transaction_id: callback.transaction_id.clone(),
                    gateway_ref: callback.gateway_ref.clone(),
                    status: callback.status.to_ascii_uppercase(),
                },
            },
        };
        let body = quick_xml::se::to_string(&envelope).map_err(|e| self.encode_error(e))?;

        self.client
            .post(CALLBACK_ACK_PATH, CONTENT_TYPE, body.into_bytes(), deadline)
            .await?;

        tracing::debug!(
            gateway = %self.name,
            transaction_id = %callback.transaction_id,
            "Callback acknowledged"
        );
        Ok(())
    }
}
