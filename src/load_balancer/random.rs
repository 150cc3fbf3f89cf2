// src/load_balancer/random.rs
use super::algorithm::{BalancingStrategy, SelectionError};
use crate::proxy::Backend;
use rand::Rng;
use std::collections::HashMap;

/// Uniform random selection. Stateless.
#[derive(Debug, Default)]
pub struct Random;

impl BalancingStrategy for Random {
    fn select(
        &mut self,
        backends: &[Backend],
        _connections: &HashMap<String, u32>,
    ) -> Result<usize, SelectionError> {
        if backends.is_empty() {
            return Err(SelectionError::NoServersAvailable);
        }
        Ok(rand::thread_rng().gen_range(0..backends.len()))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
