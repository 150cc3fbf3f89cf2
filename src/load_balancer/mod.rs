// src/load_balancer/mod.rs
mod algorithm;
mod least_connections;
mod random;
mod round_robin;

pub use algorithm::{BalancingStrategy, SelectionError};
pub use least_connections::LeastConnections;
pub use random::Random;
pub use round_robin::RoundRobin;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy: {0}")]
pub struct UnknownStrategy(pub String);

/// Resolve a strategy name from the config. The only place strategies
/// are registered. Unknown names are an error, never a silent fallback.
pub fn create_strategy(name: &str) -> Result<Box<dyn BalancingStrategy>, UnknownStrategy> {
    match name {
        "round-robin" => Ok(Box::new(RoundRobin::new())),
        "random" => Ok(Box::new(Random)),
        "least-connections" => Ok(Box::new(LeastConnections)),
        other => Err(UnknownStrategy(other.to_string())),
    }
}
