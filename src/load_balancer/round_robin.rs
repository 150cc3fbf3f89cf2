// src/load_balancer/round_robin.rs
use super::algorithm::{BalancingStrategy, SelectionError};
use crate::proxy::Backend;
use std::collections::HashMap;

/// Rotating-cursor selection. For a fixed list of N backends, N
/// consecutive calls visit each backend exactly once, in list order.
/// After the list is resized the cursor is clamped modulo the new
/// length; nothing more is promised across a resize.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalancingStrategy for RoundRobin {
    fn select(
        &mut self,
        backends: &[Backend],
        _connections: &HashMap<String, u32>,
    ) -> Result<usize, SelectionError> {
        if backends.is_empty() {
            return Err(SelectionError::NoServersAvailable);
        }
        let index = self.cursor % backends.len();
        self.cursor = (index + 1) % backends.len();
        Ok(index)
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn backends(addresses: &[&str]) -> Vec<Backend> {
        addresses
            .iter()
            .map(|a| Backend::new(Url::parse(a).unwrap()))
            .collect()
    }

    #[test]
    fn cycles_in_list_order() {
        let list = backends(&["http://a/", "http://b/", "http://c/"]);
        let connections = HashMap::new();
        let mut strategy = RoundRobin::new();
        let picks: Vec<usize> = (0..4)
            .map(|_| strategy.select(&list, &connections).unwrap())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn cursor_is_clamped_after_shrink() {
        let connections = HashMap::new();
        let mut strategy = RoundRobin::new();

        let three = backends(&["http://a/", "http://b/", "http://c/"]);
        strategy.select(&three, &connections).unwrap();
        strategy.select(&three, &connections).unwrap();

        let two = backends(&["http://a/", "http://b/"]);
        let index = strategy.select(&two, &connections).unwrap();
        assert!(index < two.len());
    }

    #[test]
    fn empty_list_fails() {
        let connections = HashMap::new();
        let mut strategy = RoundRobin::new();
        assert_eq!(
            strategy.select(&[], &connections),
            Err(SelectionError::NoServersAvailable)
        );
    }
}
