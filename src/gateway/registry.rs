//! Protocol name to gateway constructor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::{GatewayDescriptor, GatewayError, JsonGateway, PaymentGateway, SoapGateway};
use crate::config::Config;

pub type GatewayConstructor =
    fn(&GatewayDescriptor) -> Result<Arc<dyn PaymentGateway>, GatewayError>;

/// Built once at startup; read-only afterwards.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    constructors: HashMap<String, GatewayConstructor>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every protocol this crate speaks.
    pub fn with_builtin_protocols() -> Self {
        let mut registry = Self::new();
        registry.register("json", JsonGateway::build);
        registry.register("soap", SoapGateway::build);
        registry
    }

    pub fn register(&mut self, protocol: &str, constructor: GatewayConstructor) {
        self.constructors
            .insert(protocol.to_ascii_lowercase(), constructor);
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.constructors.contains_key(&protocol.to_ascii_lowercase())
    }

    pub fn build(&self, descriptor: &GatewayDescriptor) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        let constructor = self
            .constructors
            .get(&descriptor.protocol.to_ascii_lowercase())
            .ok_or_else(|| GatewayError::UnsupportedProtocol(descriptor.protocol.clone()))?;
        constructor(descriptor)
    }

    /// Descriptors for every enabled gateway, in configuration (id) order.
    pub fn descriptors(config: &Config) -> Vec<GatewayDescriptor> {
        config
            .enabled_gateways()
            .map(|(id, gateway)| GatewayDescriptor {
                id: id.clone(),
                name: gateway.display_name(id),
                base_url: gateway.url.clone(),
                protocol: gateway.protocol.to_ascii_lowercase(),
                resilience: config.resilience.clone(),
            })
            .collect()
    }

    /// Instantiates every enabled gateway. Any construction failure aborts startup.
    pub fn build_enabled(
        &self,
        config: &Config,
    ) -> Result<Vec<(GatewayDescriptor, Arc<dyn PaymentGateway>)>, GatewayError> {
        Self::descriptors(config)
            .into_iter()
            .map(|descriptor| {
                let gateway = self.build(&descriptor)?;
                tracing::info!(
                    gateway = %descriptor.name,
                    protocol = %descriptor.protocol,
                    url = %descriptor.base_url,
                    "Gateway initialized"
                );
                Ok((descriptor, gateway))
            })
            .collect()
    }
}
