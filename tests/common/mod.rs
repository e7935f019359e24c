#![allow(dead_code)]

use async_trait::async_trait;
use payment_router::config::{CircuitBreakerConfig, Config, ResilienceConfig};
use payment_router::domain::{CallbackRequest, PaymentRequest, Transaction, TransactionStatus};
use payment_router::gateway::{
    CircuitState, GatewayDescriptor, GatewayError, GatewayResponse, PaymentGateway,
};
use payment_router::ports::{RepositoryError, RepositoryResult, TransactionRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub fn resilience(max_retries: u32, breaker_enabled: bool) -> ResilienceConfig {
    ResilienceConfig {
        http_timeout_seconds: 2,
        max_retries,
        initial_backoff_millis: 10,
        max_backoff_millis: 50,
        circuit_breaker: CircuitBreakerConfig {
            enabled: breaker_enabled,
            max_requests: 1,
            interval_seconds: 60,
            timeout_seconds: 1,
            failure_ratio: 0.5,
            min_requests: 3,
        },
    }
}

pub fn descriptor(url: &str, protocol: &str, resilience: ResilienceConfig) -> GatewayDescriptor {
    GatewayDescriptor {
        id: format!("{protocol}-gateway"),
        name: format!("{protocol}-gateway"),
        base_url: url.to_string(),
        protocol: protocol.to_string(),
        resilience,
    }
}

pub fn deadline_in(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}

/// Builds a config from `(id, url, protocol)` triples.
pub fn config_with_gateways(gateways: &[(&str, &str, &str)], mock_gateways: bool) -> Config {
    let mut yaml = String::from("gateways:\n");
    for (id, url, protocol) in gateways {
        yaml.push_str(&format!(
            "  {id}:\n    url: \"{url}\"\n    enabled: true\n    protocol: {protocol}\n"
        ));
    }
    if gateways.is_empty() {
        yaml = String::from("gateways: {}\n");
    }
    yaml.push_str(&format!(
        r#"
resilience:
  httpTimeoutSeconds: 2
  maxRetries: 1
  initialBackoffMillis: 10
  maxBackoffMillis: 50
  circuitBreaker:
    enabled: true
    maxRequests: 1
    intervalSeconds: 60
    timeoutSeconds: 30
    failureRatio: 0.6
    minRequests: 3
cache:
  invalidationIntervalSeconds: 1
  ttlSeconds: 60
workerPool:
  numWorkers: 4
  queueCapacity: 16
static:
  host: "127.0.0.1"
  port: 0
  gatewayTimeoutSeconds: 5
  mockGateways: {mock_gateways}
"#
    ));
    Config::from_yaml_str(&yaml).expect("test config parses")
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

/// In-process gateway with a fixed outcome that counts its calls.
pub struct StubGateway {
    name: String,
    behavior: Behavior,
    pub calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(GatewayResponse::Json(serde_json::json!({"status": "success"}))),
            Behavior::Fail => Err(GatewayError::Failure {
                gateway: self.name.clone(),
                status: 500,
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(GatewayResponse::Json(serde_json::Value::Null))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        "stub"
    }

    fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }

    async fn process_deposit(
        &self,
        _request: &PaymentRequest,
        _deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        self.respond().await
    }

    async fn process_withdrawal(
        &self,
        _request: &PaymentRequest,
        _deadline: Instant,
    ) -> Result<GatewayResponse, GatewayError> {
        self.respond().await
    }

    async fn handle_callback(
        &self,
        _callback: &CallbackRequest,
        _deadline: Instant,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Wraps a repository, counting status updates and optionally refusing inserts.
pub struct InstrumentedRepository<R> {
    inner: R,
    fail_inserts: bool,
    pub updates: AtomicUsize,
}

impl<R> InstrumentedRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fail_inserts: false,
            updates: AtomicUsize::new(0),
        }
    }

    pub fn failing_inserts(inner: R) -> Self {
        Self {
            inner,
            fail_inserts: true,
            updates: AtomicUsize::new(0),
        }
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: TransactionRepository> TransactionRepository for InstrumentedRepository<R> {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<()> {
        if self.fail_inserts {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        self.inner.insert(tx).await
    }

    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> RepositoryResult<Transaction> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_status(id, status).await
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        self.inner.get_by_id(id).await
    }
}
