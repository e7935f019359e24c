//! Deposit and withdrawal orchestration.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{PaymentRequest, Transaction, TransactionStatus, TransactionType};
use crate::gateway::{GatewayError, Operation};
use crate::ports::{RepositoryError, TransactionRepository};
use crate::services::gateway_pool::{GatewayPool, NoGatewayAvailable};
use crate::services::worker_pool::{SubmitError, WorkerPool};
use crate::utils::sanitize::mask;
use crate::validation::{validate_payment_request, ValidationError};

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NoGatewayAvailable(#[from] NoGatewayAvailable),

    #[error("failed to persist transaction: {0}")]
    Store(#[from] RepositoryError),

    #[error("transaction {transaction_id} failed: {source}")]
    Gateway {
        transaction_id: Uuid,
        #[source]
        source: GatewayError,
    },

    #[error("gateway request timed out for transaction {0}")]
    DeadlineExceeded(Uuid),

    #[error("worker pool is closed")]
    WorkerPoolClosed,
}

impl TransactionError {
    /// Faults of this service rather than of the request or a gateway.
    pub fn is_internal(&self) -> bool {
        matches!(self, TransactionError::Store(_) | TransactionError::WorkerPoolClosed)
    }
}

/// A failed deposit or withdrawal, with the transaction as persisted when one was created.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ProcessError {
    pub transaction: Option<Transaction>,
    #[source]
    pub error: TransactionError,
}

impl ProcessError {
    fn new(transaction: Option<Transaction>, error: impl Into<TransactionError>) -> Self {
        Self {
            transaction,
            error: error.into(),
        }
    }
}

pub struct TransactionService {
    repository: Arc<dyn TransactionRepository>,
    gateways: Arc<GatewayPool>,
    workers: Arc<WorkerPool>,
    gateway_timeout: Duration,
}

impl TransactionService {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        gateways: Arc<GatewayPool>,
        workers: Arc<WorkerPool>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateways,
            workers,
            gateway_timeout,
        }
    }

    pub async fn create_and_process_deposit(
        &self,
        request: PaymentRequest,
    ) -> Result<Transaction, ProcessError> {
        self.create_and_process(TransactionType::Deposit, request).await
    }

    pub async fn create_and_process_withdrawal(
        &self,
        request: PaymentRequest,
    ) -> Result<Transaction, ProcessError> {
        self.create_and_process(TransactionType::Withdrawal, request).await
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, RepositoryError> {
        self.repository.update_status(id, status).await
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
        self.repository.get_by_id(id).await
    }

    async fn create_and_process(
        &self,
        kind: TransactionType,
        request: PaymentRequest,
    ) -> Result<Transaction, ProcessError> {
        let request = validate_payment_request(&request).map_err(|e| ProcessError::new(None, e))?;

        let transaction = Transaction::new(kind, request.account.clone(), request.amount.clone());
        self.repository
            .insert(&transaction)
            .await
            .map_err(|e| ProcessError::new(None, e))?;

        tracing::info!(
            transaction_id = %transaction.id,
            kind = %kind,
            account = %mask(&transaction.account),
            amount = %transaction.amount,
            "Transaction created"
        );

        let gateway = match self.gateways.round_robin() {
            Ok(gateway) => gateway,
            Err(e) => {
                tracing::error!(transaction_id = %transaction.id, "No gateway available, transaction left pending");
                return Err(ProcessError::new(Some(transaction), e));
            }
        };

        let operation = match kind {
            TransactionType::Deposit => Operation::Deposit,
            TransactionType::Withdrawal => Operation::Withdrawal,
        };
        let deadline = Instant::now() + self.gateway_timeout;
        let gateway_name = gateway.name().to_string();

        let outcome = self
            .workers
            .submit(deadline, move || async move {
                match operation {
                    Operation::Deposit => gateway.process_deposit(&request, deadline).await,
                    Operation::Withdrawal => gateway.process_withdrawal(&request, deadline).await,
                }
            })
            .await;

        match outcome {
            Ok(_) => self.complete(transaction, &gateway_name).await,
            Err(e) => {
                let error = match e {
                    SubmitError::Task(source) => TransactionError::Gateway {
                        transaction_id: transaction.id,
                        source,
                    },
                    SubmitError::DeadlineExceeded => TransactionError::DeadlineExceeded(transaction.id),
                    SubmitError::Closed => TransactionError::WorkerPoolClosed,
                };
                tracing::warn!(
                    transaction_id = %transaction.id,
                    gateway = %gateway_name,
                    error = %error,
                    "Gateway call failed"
                );
                let failed = self.mark_failed(transaction).await;
                Err(ProcessError::new(Some(failed), error))
            }
        }
    }

    async fn complete(
        &self,
        transaction: Transaction,
        gateway: &str,
    ) -> Result<Transaction, ProcessError> {
        match self
            .repository
            .update_status(transaction.id, TransactionStatus::Success)
            .await
        {
            Ok(updated) => {
                tracing::info!(transaction_id = %updated.id, gateway = %gateway, "Transaction succeeded");
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(transaction_id = %transaction.id, error = %e, "Failed to mark transaction successful");
                Err(ProcessError::new(Some(transaction), e))
            }
        }
    }

    async fn mark_failed(&self, transaction: Transaction) -> Transaction {
        match self
            .repository
            .update_status(transaction.id, TransactionStatus::Failed)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(transaction_id = %transaction.id, error = %e, "Failed to mark transaction failed");
                transaction
            }
        }
    }
}
