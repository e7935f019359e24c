use crate::config::Config;
use crate::gateway::GatewayRegistry;
use anyhow::{Context, Result};

pub struct ValidationReport {
    pub gateways: bool,
    pub resilience: bool,
    pub worker_pool: bool,
    pub server: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.gateways && self.resilience && self.worker_pool && self.server
    }

    pub fn print(&self) {
        println!("\n=== Configuration Validation Report ===");
        println!("Gateways:     {}", status(self.gateways));
        println!("Resilience:   {}", status(self.resilience));
        println!("Worker Pool:  {}", status(self.worker_pool));
        println!("Server:       {}", status(self.server));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=======================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub fn validate_config(config: &Config, registry: &GatewayRegistry) -> ValidationReport {
    let mut report = ValidationReport {
        gateways: true,
        resilience: true,
        worker_pool: true,
        server: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_gateways(config, registry) {
        report.gateways = false;
        report.errors.push(format!("Gateways: {:#}", e));
    }

    if let Err(e) = validate_resilience(config) {
        report.resilience = false;
        report.errors.push(format!("Resilience: {:#}", e));
    }

    if config.worker_pool.num_workers == 0 {
        report.worker_pool = false;
        report.errors.push("Worker pool: numWorkers must be greater than 0".to_string());
    }

    if let Err(e) = validate_server(config) {
        report.server = false;
        report.errors.push(format!("Server: {:#}", e));
    }

    report
}

fn validate_gateways(config: &Config, registry: &GatewayRegistry) -> Result<()> {
    if config.enabled_gateways().next().is_none() {
        anyhow::bail!("at least one gateway must be enabled");
    }

    for (id, gateway) in config.enabled_gateways() {
        if !registry.supports(&gateway.protocol) {
            anyhow::bail!("gateway {} uses unsupported protocol '{}'", id, gateway.protocol);
        }
        url::Url::parse(&gateway.url)
            .with_context(|| format!("gateway {} url '{}' is not a valid URL", id, gateway.url))?;
    }

    Ok(())
}

fn validate_resilience(config: &Config) -> Result<()> {
    let resilience = &config.resilience;
    if resilience.http_timeout_seconds == 0 {
        anyhow::bail!("httpTimeoutSeconds must be greater than 0");
    }
    if resilience.initial_backoff_millis > resilience.max_backoff_millis {
        anyhow::bail!("initialBackoffMillis must not exceed maxBackoffMillis");
    }

    let breaker = &resilience.circuit_breaker;
    if breaker.enabled {
        if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
            anyhow::bail!("circuitBreaker.failureRatio must be in (0, 1]");
        }
        if breaker.max_requests == 0 {
            anyhow::bail!("circuitBreaker.maxRequests must be greater than 0");
        }
    }

    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    if config.server.host.trim().is_empty() {
        anyhow::bail!("host must not be empty");
    }
    if config.server.gateway_timeout_seconds == 0 {
        anyhow::bail!("gatewayTimeoutSeconds must be greater than 0");
    }
    if config.server.default_timeout_seconds == 0 {
        anyhow::bail!("defaultTimeoutSeconds must be greater than 0");
    }
    if config.cache.ttl_seconds == 0 {
        anyhow::bail!("cache ttlSeconds must be greater than 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
gateways:
  gateway-a:
    url: "http://localhost:9000"
    enabled: true
resilience:
  httpTimeoutSeconds: 1
  maxRetries: 1
  initialBackoffMillis: 10
  maxBackoffMillis: 100
  circuitBreaker:
    enabled: true
    maxRequests: 1
    intervalSeconds: 10
    timeoutSeconds: 10
    failureRatio: 0.5
cache:
  invalidationIntervalSeconds: 1
  ttlSeconds: 60
workerPool:
  numWorkers: 2
static:
  host: localhost
  port: 8080
  gatewayTimeoutSeconds: 5
"#;

    fn validate(raw: &str) -> ValidationReport {
        let config = Config::from_yaml_str(raw).unwrap();
        validate_config(&config, &GatewayRegistry::with_builtin_protocols())
    }

    #[test]
    fn test_valid_config_passes() {
        let report = validate(VALID);
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_bad_gateway_url_fails() {
        let report = validate(&VALID.replace("http://localhost:9000", "not a url"));
        assert!(!report.gateways);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_out_of_range_failure_ratio_fails() {
        let report = validate(&VALID.replace("failureRatio: 0.5", "failureRatio: 1.5"));
        assert!(!report.resilience);
    }

    #[test]
    fn test_zero_workers_fails() {
        let report = validate(&VALID.replace("numWorkers: 2", "numWorkers: 0"));
        assert!(!report.worker_pool);
    }

    #[test]
    fn test_zero_request_timeout_fails() {
        let report = validate(&VALID.replace(
            "gatewayTimeoutSeconds: 5",
            "gatewayTimeoutSeconds: 5\n  defaultTimeoutSeconds: 0",
        ));
        assert!(!report.server);
        assert!(report.errors[0].contains("defaultTimeoutSeconds"));
    }

    #[test]
    fn test_no_enabled_gateway_fails() {
        let report = validate(&VALID.replace("enabled: true\nresilience", "enabled: false\nresilience"));
        assert!(!report.gateways);
    }
}
