//! Transaction domain entity.
//! Framework-agnostic representation of a deposit or withdrawal routed to a gateway.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a transaction. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether a record currently in `self` may be moved to `next`.
    /// Re-applying the current status is allowed and treated as a no-op by stores.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == next || !self.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for TransactionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: BigDecimal,
    pub account: String,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(kind: TransactionType, account: String, amount: BigDecimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            account,
            status: TransactionStatus::Pending,
            timestamp: Utc::now(),
        }
    }
}

/// The protocol-independent input every gateway receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub account: String,
    pub amount: BigDecimal,
}

impl PaymentRequest {
    pub fn new(account: impl Into<String>, amount: BigDecimal) -> Self {
        Self {
            account: account.into(),
            amount,
        }
    }
}
