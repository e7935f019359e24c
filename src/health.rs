use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::gateway::{CircuitState, PaymentGateway};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Unhealthy { status: String, error: String },
    Available { status: String, circuit: String },
}

impl DependencyStatus {
    pub fn status(&self) -> &str {
        match self {
            DependencyStatus::Unhealthy { status, .. } | DependencyStatus::Available { status, .. } => status,
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> String;
    async fn check(&self) -> DependencyStatus;
}

/// Reports a gateway's circuit breaker state. Makes no network calls.
pub struct GatewayChecker {
    gateway: Arc<dyn PaymentGateway>,
}

impl GatewayChecker {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DependencyChecker for GatewayChecker {
    fn name(&self) -> String {
        self.gateway.name().to_string()
    }

    async fn check(&self) -> DependencyStatus {
        let circuit = self.gateway.circuit_state();
        match circuit {
            CircuitState::Closed => DependencyStatus::Available {
                status: "healthy".to_string(),
                circuit: circuit.to_string(),
            },
            CircuitState::HalfOpen => DependencyStatus::Available {
                status: "degraded".to_string(),
                circuit: circuit.to_string(),
            },
            CircuitState::Open => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "circuit breaker open".to_string(),
            },
        }
    }
}

pub async fn check_health(
    checkers: Vec<Box<dyn DependencyChecker>>,
    start_time: Instant,
) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let results = futures::future::join_all(checkers.iter().map(|checker| async move {
        let status = timeout(timeout_duration, checker.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "timeout".to_string(),
            });
        (checker.name(), status)
    }))
    .await;

    let dependencies: HashMap<String, DependencyStatus> = results.into_iter().collect();
    let overall_status = determine_overall_status(&dependencies);

    HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

/// Unhealthy when no gateway can take traffic, degraded when some cannot.
fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let unhealthy = dependencies
        .values()
        .filter(|status| status.status() == "unhealthy")
        .count();
    let healthy = dependencies
        .values()
        .filter(|status| status.status() == "healthy")
        .count();

    if dependencies.is_empty() || unhealthy == dependencies.len() {
        "unhealthy".to_string()
    } else if healthy < dependencies.len() {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
