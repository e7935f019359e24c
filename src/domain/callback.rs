//! Asynchronous status notifications sent back by gateways.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// A decoded callback, independent of the wire format it arrived in.
///
/// Every field defaults when absent so that incomplete payloads reach
/// validation instead of failing in the decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackRequest {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub gateway_ref: String,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub status: String,
    pub message: String,
}

impl CallbackResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
