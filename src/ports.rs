//! Repository port. Services depend on this trait; adapters implement it.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("transaction {0} not found")]
    NotFound(Uuid),

    #[error("transaction {0} already exists")]
    AlreadyExists(Uuid),

    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("transaction store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<()>;

    /// Atomically moves a transaction to `status` and returns the stored record.
    /// Applying the status it already has succeeds without changing anything.
    async fn update_status(&self, id: Uuid, status: TransactionStatus)
        -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;
}
