pub mod in_memory_transaction_repository;

pub use in_memory_transaction_repository::InMemoryTransactionRepository;
