// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no servers available")]
    NoServersAvailable,
}

/// A selection algorithm. Implementations live inside the pool's lock,
/// so `select` takes `&mut self` and runs as part of the pool's critical
/// section; any internal state (the round-robin cursor) is mutated only
/// here.
pub trait BalancingStrategy: Send + std::fmt::Debug {
    /// Pick an index into `backends`. `connections` maps a backend
    /// address to its current active-connection count.
    fn select(
        &mut self,
        backends: &[Backend],
        connections: &HashMap<String, u32>,
    ) -> Result<usize, SelectionError>;

    fn name(&self) -> &'static str;
}
