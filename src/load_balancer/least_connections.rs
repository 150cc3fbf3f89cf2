// src/load_balancer/least_connections.rs
use super::algorithm::{BalancingStrategy, SelectionError};
use crate::proxy::Backend;
use std::collections::HashMap;

/// Picks the backend with the fewest active connections; ties go to the
/// earliest list entry. The pool increments the winner's count in the
/// same critical section as the scan, so two concurrent selections can
/// never both see the same minimum.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl BalancingStrategy for LeastConnections {
    fn select(
        &mut self,
        backends: &[Backend],
        connections: &HashMap<String, u32>,
    ) -> Result<usize, SelectionError> {
        if backends.is_empty() {
            return Err(SelectionError::NoServersAvailable);
        }

        let mut best = 0;
        let mut min = u32::MAX;
        for (index, backend) in backends.iter().enumerate() {
            let count = connections.get(backend.address()).copied().unwrap_or(0);
            if count < min {
                min = count;
                best = index;
            }
        }
        Ok(best)
    }

    fn name(&self) -> &'static str {
        "least-connections"
    }
}
