use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Process-wide configuration, loaded once at startup and shared behind an `Arc`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Keyed by gateway id. Iteration order (sorted by id) is the round-robin order.
    pub gateways: BTreeMap<String, GatewayConfig>,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    pub worker_pool: WorkerPoolConfig,
    #[serde(rename = "static")]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub url: String,
    pub enabled: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceConfig {
    pub http_timeout_seconds: u64,
    pub max_retries: u32,
    pub initial_backoff_millis: u64,
    pub max_backoff_millis: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Concurrent trial calls admitted while half-open.
    pub max_requests: u32,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub failure_ratio: f64,
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub invalidation_interval_seconds: u64,
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolConfig {
    pub num_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub gateway_timeout_seconds: u64,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub mock_gateways: bool,
    /// Upper bound on handling one inbound HTTP request.
    #[serde(default = "default_request_timeout_seconds")]
    pub default_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_protocol() -> String {
    "json".to_string()
}

fn default_min_requests() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_service_name() -> String {
    "payment-router".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads `.env`, reads the YAML file and applies environment overrides.
    ///
    /// The path is taken from the argument, then `CONFIG_PATH`, then [`DEFAULT_CONFIG_PATH`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::parse(&raw)?;
        config.apply_env_overrides()?;
        config.resolve_gateway_urls();
        Ok(config)
    }

    /// Parses YAML and resolves gateway URL templates. No environment lookups.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let mut config = Self::parse(raw)?;
        config.resolve_gateway_urls();
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("failed to parse config YAML")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SERVER_PORT") {
            self.server.port = port.parse().context("SERVER_PORT must be a port number")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Substitutes `{host}` and `{port}` in gateway URLs, so the built-in
    /// simulators can be addressed without hardcoding the listen address.
    pub fn resolve_gateway_urls(&mut self) {
        let host = self.server.host.clone();
        let port = self.server.port.to_string();
        for gateway in self.gateways.values_mut() {
            gateway.url = gateway.url.replace("{host}", &host).replace("{port}", &port);
        }
    }

    pub fn enabled_gateways(&self) -> impl Iterator<Item = (&String, &GatewayConfig)> {
        self.gateways.iter().filter(|(_, gateway)| gateway.enabled)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.server.gateway_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.default_timeout_seconds)
    }
}

impl GatewayConfig {
    pub fn display_name(&self, id: &str) -> String {
        self.name.clone().unwrap_or_else(|| id.to_string())
    }
}

impl ResilienceConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_millis)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_millis)
    }

    /// Ceiling on the total time spent retrying one request.
    pub fn max_elapsed(&self) -> Duration {
        self.http_timeout() * self.max_retries
    }
}

impl CircuitBreakerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn invalidation_interval(&self) -> Duration {
        Duration::from_secs(self.invalidation_interval_seconds)
    }
}
