//! Domain layer: entities shared by every gateway protocol and service.

pub mod callback;
pub mod transaction;

pub use callback::{CallbackRequest, CallbackResponse};
pub use transaction::{
    ParseStatusError, PaymentRequest, Transaction, TransactionStatus, TransactionType,
};
