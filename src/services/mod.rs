pub mod callback;
pub mod gateway_pool;
pub mod transaction_service;
pub mod worker_pool;

pub use callback::{CallbackError, CallbackFormat, CallbackService};
pub use gateway_pool::{GatewayPool, NoGatewayAvailable};
pub use transaction_service::{ProcessError, TransactionError, TransactionService};
pub use worker_pool::{SubmitError, WorkerPool};
