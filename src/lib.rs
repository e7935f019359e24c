pub mod adapters;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::adapters::InMemoryTransactionRepository;
use crate::cache::ExpiringCache;
use crate::config::Config;
use crate::domain::CallbackResponse;
use crate::gateway::GatewayRegistry;
use crate::ports::TransactionRepository;
use crate::services::{CallbackFormat, CallbackService, GatewayPool, TransactionService, WorkerPool};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transactions: Arc<TransactionService>,
    pub gateways: Arc<GatewayPool>,
    /// Keyed by gateway id, as used in `/callbacks/:gateway`.
    pub callbacks: Arc<HashMap<String, Arc<CallbackService>>>,
    pub start_time: Instant,
}

/// Wires every component from configuration with the in-memory store.
/// Must be called from within a tokio runtime.
pub fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    build_state_with_repository(config, Arc::new(InMemoryTransactionRepository::new()))
}

pub fn build_state_with_repository(
    config: Arc<Config>,
    repository: Arc<dyn TransactionRepository>,
) -> anyhow::Result<AppState> {
    let registry = GatewayRegistry::with_builtin_protocols();
    let built = registry.build_enabled(&config)?;
    if built.is_empty() {
        tracing::warn!("No gateways enabled; deposits and withdrawals will be rejected");
    }

    let gateways = Arc::new(GatewayPool::new(
        built.iter().map(|(_, gateway)| gateway.clone()).collect(),
    ));
    let workers = Arc::new(WorkerPool::new(
        config.worker_pool.num_workers,
        config.worker_pool.queue_capacity,
    ));
    let transactions = Arc::new(TransactionService::new(
        repository,
        gateways.clone(),
        workers,
        config.gateway_timeout(),
    ));

    let cache: Arc<ExpiringCache<CallbackResponse>> = Arc::new(ExpiringCache::new(
        config.cache.ttl(),
        config.cache.invalidation_interval(),
    ));

    let callbacks = built
        .into_iter()
        .map(|(descriptor, gateway)| {
            let service = CallbackService::new(
                descriptor.id.clone(),
                CallbackFormat::for_protocol(&descriptor.protocol),
                transactions.clone(),
                cache.clone(),
            )
            .with_acknowledger(gateway);
            (descriptor.id, Arc::new(service))
        })
        .collect::<HashMap<_, _>>();

    Ok(AppState {
        config,
        transactions,
        gateways,
        callbacks: Arc::new(callbacks),
        start_time: Instant::now(),
    })
}

pub fn create_app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/deposit", post(handlers::transactions::deposit))
        .route("/withdrawal", post(handlers::transactions::withdrawal))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/callbacks/:gateway", post(handlers::callbacks::handle_callback));

    if state.config.server.mock_gateways {
        router = router.merge(handlers::simulator::routes::<AppState>());
    }

    let request_timeout = state.config.request_timeout();
    middleware::with_request_guards(router, request_timeout).with_state(state)
}
