//! Simulated confirmations for development
//!
//! Returns a random depth in `0..=max + 1` on every call. Configuration
//! refuses this source in production.

use async_trait::async_trait;
use rand::Rng;

use super::{ChainError, ConfirmationSource};

/// Depth treated as final by the simulation
pub const DEFAULT_MAX_CONFIRMATIONS: u32 = 6;

#[derive(Debug, Clone)]
pub struct SimulatedSource {
    max_confirmations: u32,
}

impl SimulatedSource {
    pub fn new(max_confirmations: u32) -> Self {
        Self { max_confirmations }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONFIRMATIONS)
    }
}

#[async_trait]
impl ConfirmationSource for SimulatedSource {
    async fn confirmations(&self, _tx_hash: &str) -> Result<u32, ChainError> {
        // can overshoot the maximum slightly
        Ok(rand::thread_rng().gen_range(0..=self.max_confirmations + 1))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
