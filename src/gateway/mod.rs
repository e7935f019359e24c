//! Outbound payment gateways.
//!
//! Every wire protocol implements [`PaymentGateway`]; callers never see which
//! protocol a gateway speaks.

pub mod json;
pub mod registry;
pub mod resilience;
pub mod soap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ResilienceConfig;
use crate::domain::{CallbackRequest, PaymentRequest};

pub use json::JsonGateway;
pub use registry::GatewayRegistry;
pub use resilience::{CircuitState, ResilientClient};
pub use soap::{SoapGateway, SoapResponse};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("circuit breaker open for gateway {0}")]
    CircuitOpen(String),

    #[error("gateway {0} request timed out")]
    Timeout(String),

    #[error("gateway {gateway} failure: HTTP {status}")]
    Failure { gateway: String, status: u16 },

    #[error("gateway {gateway} transport error: {source}")]
    Transport {
        gateway: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("gateway {gateway} returned an undecodable response: {reason}")]
    ResponseDecode { gateway: String, reason: String },

    #[error("failed to encode request for gateway {gateway}: {reason}")]
    RequestEncode { gateway: String, reason: String },

    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported gateway protocol: {0}")]
    UnsupportedProtocol(String),
}

impl GatewayError {
    pub(crate) fn from_transport(gateway: String, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            GatewayError::Timeout(gateway)
        } else {
            GatewayError::Transport { gateway, source }
        }
    }

    /// Transient failures worth another attempt. Non-2xx answers are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transport { .. })
    }
}

/// Decoded success payload of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Json(serde_json::Value),
    Soap(SoapResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdrawal,
}

impl Operation {
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Deposit => "/deposit",
            Operation::Withdrawal => "/withdrawal",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdrawal => "withdrawal",
        }
    }
}

/// Everything needed to construct a gateway client.
#[derive(Debug, Clone)]
pub struct GatewayDescriptor {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub protocol: String,
    pub resilience: ResilienceConfig,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Display name used in logs and errors.
    fn name(&self) -> &str;

    fn protocol(&self) -> &str;

    fn circuit_state(&self) -> CircuitState;

    async fn process_deposit(
        &self,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError>;

    async fn process_withdrawal(
        &self,
        request: &PaymentRequest,
        deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError>;

    /// Acknowledges a reconciled callback towards the backend, when the protocol needs it.
    async fn handle_callback(
        &self,
        callback: &CallbackRequest,
        deadline: Instant,
    ) -> Result<(), GatewayError>;
}
