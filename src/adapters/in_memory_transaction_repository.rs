//! In-memory implementation of TransactionRepository.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// Volatile transaction store backed by a sharded concurrent map.
/// Status changes hold the shard lock for the key, so check-and-set is atomic per transaction.
#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: DashMap<Uuid, Transaction>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<()> {
        match self.transactions.entry(tx.id) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(tx.id)),
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                tracing::debug!(transaction_id = %tx.id, kind = %tx.kind, "Transaction stored");
                Ok(())
            }
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> RepositoryResult<Transaction> {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;

        let current = entry.status;
        if !current.can_transition_to(status) {
            return Err(RepositoryError::InvalidTransition {
                id,
                from: current,
                to: status,
            });
        }

        if current != status {
            entry.status = status;
            tracing::debug!(
                transaction_id = %id,
                from = %current,
                to = %status,
                "Transaction status updated"
            );
        }

        Ok(entry.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|entry| entry.clone()))
    }
}
