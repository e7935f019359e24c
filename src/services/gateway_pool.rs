use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::gateway::PaymentGateway;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no payment gateway available")]
pub struct NoGatewayAvailable;

/// The enabled gateways with a round-robin cursor.
pub struct GatewayPool {
    gateways: Vec<Arc<dyn PaymentGateway>>,
    cursor: Mutex<usize>,
}

impl GatewayPool {
    pub fn new(gateways: Vec<Arc<dyn PaymentGateway>>) -> Self {
        Self {
            gateways,
            cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    pub fn gateways(&self) -> Result<Vec<Arc<dyn PaymentGateway>>, NoGatewayAvailable> {
        if self.gateways.is_empty() {
            return Err(NoGatewayAvailable);
        }
        Ok(self.gateways.clone())
    }

    /// Returns `gateways[cursor]` and advances the cursor, as one critical section.
    pub fn round_robin(&self) -> Result<Arc<dyn PaymentGateway>, NoGatewayAvailable> {
        if self.gateways.is_empty() {
            return Err(NoGatewayAvailable);
        }

        // the cursor is always a valid index, so a poisoned lock is still usable
        let mut cursor = self
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let gateway = self.gateways[*cursor % self.gateways.len()].clone();
        *cursor = (*cursor + 1) % self.gateways.len();

        tracing::debug!(gateway = %gateway.name(), "Gateway selected");
        Ok(gateway)
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways
            .iter()
            .find(|gateway| gateway.name() == name)
            .cloned()
    }
}
