//! Circuit breaking and retry for outbound gateway calls.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config as BreakerConfig, Error as FailsafeError, FailurePolicy, Instrument, StateMachine};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::time::Instant;

use super::GatewayError;
use crate::config::{CircuitBreakerConfig, ResilienceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trips when a rolling window holds at least `min_requests` calls and the
/// failure ratio reaches the threshold.
#[derive(Debug)]
pub struct FailureRatioPolicy {
    window: Duration,
    min_requests: u32,
    failure_ratio: f64,
    open_timeout: Duration,
    window_start: StdInstant,
    requests: u32,
    failures: u32,
}

impl FailureRatioPolicy {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            window: config.interval(),
            min_requests: config.min_requests.max(1),
            failure_ratio: config.failure_ratio,
            open_timeout: config.open_timeout(),
            window_start: StdInstant::now(),
            requests: 0,
            failures: 0,
        }
    }

    fn roll_window(&mut self) {
        // a zero interval never clears counts while closed
        if !self.window.is_zero() && self.window_start.elapsed() >= self.window {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.window_start = StdInstant::now();
        self.requests = 0;
        self.failures = 0;
    }
}

impl FailurePolicy for FailureRatioPolicy {
    fn record_success(&mut self) {
        self.roll_window();
        self.requests += 1;
    }

    fn mark_dead_on_failure(&mut self) -> Option<Duration> {
        self.roll_window();
        self.requests += 1;
        self.failures += 1;

        let ratio = self.failures as f64 / self.requests as f64;
        if self.requests >= self.min_requests && ratio >= self.failure_ratio {
            self.reset();
            Some(self.open_timeout)
        } else {
            None
        }
    }

    fn revived(&mut self) {
        self.reset();
    }
}

/// Mirrors breaker transitions into an atomic so state can be read without
/// side effects, and bounds concurrent half-open trials.
#[derive(Debug, Clone)]
pub struct BreakerObserver {
    gateway: Arc<str>,
    state: Arc<AtomicU8>,
    trials: Arc<AtomicU32>,
}

impl BreakerObserver {
    fn new(gateway: &str) -> Self {
        Self {
            gateway: Arc::from(gateway),
            state: Arc::new(AtomicU8::new(CircuitState::Closed.as_u8())),
            trials: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: CircuitState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Claims one of `max` trial slots, held until the permit is dropped.
    fn try_claim_trial(&self, max: u32) -> Option<TrialPermit> {
        self.trials
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < max).then_some(taken + 1)
            })
            .ok()
            .map(|_| TrialPermit {
                trials: self.trials.clone(),
            })
    }
}

/// An in-flight call made while the breaker is not closed. Released on drop,
/// including when the calling future is cancelled before a result is recorded.
#[derive(Debug)]
struct TrialPermit {
    trials: Arc<AtomicU32>,
}

impl Drop for TrialPermit {
    fn drop(&mut self) {
        self.trials.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Instrument for BreakerObserver {
    fn on_call_rejected(&self) {
        tracing::debug!(gateway = %self.gateway, "Circuit breaker rejected call");
    }

    fn on_open(&self) {
        self.set(CircuitState::Open);
        tracing::warn!(gateway = %self.gateway, from = "closed", to = "open", "Circuit breaker state changed");
    }

    fn on_half_open(&self) {
        self.set(CircuitState::HalfOpen);
        tracing::info!(gateway = %self.gateway, from = "open", to = "half_open", "Circuit breaker state changed");
    }

    fn on_closed(&self) {
        self.set(CircuitState::Closed);
        tracing::info!(gateway = %self.gateway, to = "closed", "Circuit breaker state changed");
    }
}

type Breaker = StateMachine<FailureRatioPolicy, BreakerObserver>;

#[derive(Clone)]
struct GuardedBreaker {
    machine: Breaker,
    observer: BreakerObserver,
    max_half_open: u32,
}

/// Exponential backoff schedule used between retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    pub max_retries: u32,
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            multiplier: 2,
            max_retries: config.max_retries,
            max_elapsed: config.max_elapsed(),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// HTTP client for one gateway: timeouts, circuit breaking and retry.
#[derive(Clone)]
pub struct ResilientClient {
    client: Client,
    gateway: String,
    base_url: String,
    retry: RetryPolicy,
    breaker: Option<GuardedBreaker>,
}

impl ResilientClient {
    pub fn new(gateway: &str, base_url: &str, config: &ResilienceConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| GatewayError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        let breaker = config.circuit_breaker.enabled.then(|| {
            let observer = BreakerObserver::new(gateway);
            let machine = BreakerConfig::new()
                .failure_policy(FailureRatioPolicy::new(&config.circuit_breaker))
                .instrument(observer.clone())
                .build();
            GuardedBreaker {
                machine,
                observer,
                max_half_open: config.circuit_breaker.max_requests.max(1),
            }
        });

        Ok(Self {
            client,
            gateway: gateway.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(config),
            breaker,
        })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker
            .as_ref()
            .map(|breaker| breaker.observer.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// POSTs `body` to `{base_url}{path}`, retrying transient failures with
    /// exponential backoff until the retry budget or `deadline` runs out.
    /// Returns the body of the first 2xx response.
    pub async fn post(
        &self,
        path: &str,
        content_type: &'static str,
        body: Vec<u8>,
        deadline: Instant,
    ) -> Result<Vec<u8>, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();
        let mut retries = 0u32;

        loop {
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout(self.gateway.clone()));
            }

            let err = match self.attempt(&url, content_type, body.clone(), deadline).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => err,
            };

            if !err.is_retryable() || retries >= self.retry.max_retries {
                return Err(err);
            }

            retries += 1;
            let delay = self.retry.delay_for(retries);
            if started.elapsed() + delay >= self.retry.max_elapsed || Instant::now() + delay >= deadline {
                return Err(err);
            }

            tracing::warn!(
                gateway = %self.gateway,
                url = %url,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Gateway call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        url: &str,
        content_type: &'static str,
        body: Vec<u8>,
        deadline: Instant,
    ) -> Result<Vec<u8>, GatewayError> {
        let request = send(self.client.clone(), self.gateway.clone(), url.to_string(), content_type, body, deadline);

        let Some(breaker) = &self.breaker else {
            return request.await;
        };

        // once the breaker has opened, every call that reaches failsafe is a
        // potential half-open trial and must hold a slot until it settles
        let _permit = if breaker.observer.state() == CircuitState::Closed {
            None
        } else {
            match breaker.observer.try_claim_trial(breaker.max_half_open) {
                Some(permit) => Some(permit),
                None => {
                    tracing::debug!(gateway = %self.gateway, "Half-open trial slots exhausted");
                    return Err(GatewayError::CircuitOpen(self.gateway.clone()));
                }
            }
        };

        match breaker.machine.call(request).await {
            Ok(bytes) => Ok(bytes),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(self.gateway.clone())),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn send(
    client: Client,
    gateway: String,
    url: String,
    content_type: &'static str,
    body: Vec<u8>,
    deadline: Instant,
) -> Result<Vec<u8>, GatewayError> {
    let exchange = async {
        let response = client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok::<_, reqwest::Error>(Ok(bytes.to_vec()))
    };

    match tokio::time::timeout_at(deadline, exchange).await {
        Err(_) => Err(GatewayError::Timeout(gateway)),
        Ok(Err(e)) => Err(GatewayError::from_transport(gateway, e)),
        Ok(Ok(Err(status))) => Err(GatewayError::Failure { gateway, status }),
        Ok(Ok(Ok(bytes))) => Ok(bytes),
    }
}
