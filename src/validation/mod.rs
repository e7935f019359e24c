use bigdecimal::BigDecimal;
use std::fmt;

use crate::domain::PaymentRequest;

pub const ACCOUNT_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Drops control characters and collapses runs of whitespace.
pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_account(account: &str) -> ValidationResult {
    let account = sanitize_string(account);
    validate_required("account", &account)?;
    validate_max_len("account", &account, ACCOUNT_MAX_LEN)
}

/// Returns the request with its account sanitized, or the first failing rule.
pub fn validate_payment_request(request: &PaymentRequest) -> Result<PaymentRequest, ValidationError> {
    validate_account(&request.account)?;
    validate_positive_amount(&request.amount)?;

    Ok(PaymentRequest {
        account: sanitize_string(&request.account),
        amount: request.amount.clone(),
    })
}
