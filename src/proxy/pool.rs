// src/proxy/pool.rs
use super::backend::Backend;
use crate::load_balancer::{BalancingStrategy, SelectionError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid backend address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
}

/// Outcome of `record_failure` for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The consecutive-failure counter advanced but stayed below the
    /// eviction threshold.
    Counted { failures: u32, threshold: u32 },
    /// The counter reached the threshold and the backend was removed.
    Evicted,
    /// No backend with that address is in the pool.
    NotFound,
}

/// Point-in-time view of one backend, taken under the pool lock.
#[derive(Debug, Clone)]
pub struct BackendSnapshot {
    pub address: String,
    pub healthy: bool,
    pub connections: u32,
    pub failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

/// The server pool: the ordered backend list, its per-backend counters,
/// and the active selection strategy, all behind one mutex. Every public
/// operation takes the lock exactly once, so no operation, from the
/// request path or the health path, ever observes a half-updated pool,
/// and a strategy swap is atomic with respect to in-flight selections.
pub struct ServerPool {
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    backends: Vec<Backend>,
    connections: HashMap<String, u32>,
    failures: HashMap<String, u32>,
    strategy: Box<dyn BalancingStrategy>,
    remove_after: u32,
}

/// A selection result. Holds the chosen backend's connection-count
/// increment and gives it back on drop, so a dispatch attempt that is
/// cancelled mid-flight still releases its count.
pub struct SelectedBackend {
    pub backend: Backend,
    _guard: ConnectionGuard,
}

struct ConnectionGuard {
    pool: Arc<ServerPool>,
    address: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.pool.release_connection(&self.address);
    }
}

impl ServerPool {
    pub fn new(strategy: Box<dyn BalancingStrategy>, remove_after: u32) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                backends: Vec::new(),
                connections: HashMap::new(),
                failures: HashMap::new(),
                strategy,
                remove_after,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a backend, marked healthy, with zeroed counters. Adding
    /// the same address twice yields two list entries that share one
    /// pair of counter entries.
    pub fn add_backend(&self, address: &str) -> Result<(), PoolError> {
        let url = Url::parse(address).map_err(|source| PoolError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;
        let backend = Backend::new(url);
        let key = backend.address().to_string();

        let mut inner = self.lock();
        inner.connections.entry(key.clone()).or_insert(0);
        inner.failures.entry(key.clone()).or_insert(0);
        inner.backends.push(backend);
        info!(address = %key, "added backend");
        Ok(())
    }

    /// Remove the first list entry matching `address`. Counter entries
    /// go with it unless a duplicate entry remains. No-op (returns
    /// false) if the address is not present.
    pub fn remove_backend(&self, address: &str) -> bool {
        let key = normalize(address);
        let mut inner = self.lock();
        let removed = remove_first(&mut inner, &key);
        if removed {
            info!(address = %key, "removed backend");
        }
        removed
    }

    /// Delegate to the active strategy and increment the winner's
    /// connection count, all under one lock acquisition.
    pub fn select_backend(self: &Arc<Self>) -> Result<SelectedBackend, SelectionError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let index = inner.strategy.select(&inner.backends, &inner.connections)?;
        let backend = inner.backends[index].clone();
        let key = backend.address().to_string();
        *inner.connections.entry(key.clone()).or_insert(0) += 1;

        Ok(SelectedBackend {
            backend,
            _guard: ConnectionGuard {
                pool: Arc::clone(self),
                address: key,
            },
        })
    }

    /// Atomically replace the active strategy. Selections in flight see
    /// either the old or the new strategy in full, never a mixture.
    pub fn set_strategy(&self, strategy: Box<dyn BalancingStrategy>) {
        let mut inner = self.lock();
        info!(from = inner.strategy.name(), to = strategy.name(), "strategy changed");
        inner.strategy = strategy;
    }

    pub fn strategy_name(&self) -> &'static str {
        self.lock().strategy.name()
    }

    /// Bump the consecutive-failure counter for `address` and mark its
    /// entries unhealthy; evicts the backend once the counter reaches
    /// the threshold.
    pub fn record_failure(&self, address: &str) -> FailureOutcome {
        let key = normalize(address);
        let mut inner = self.lock();
        if !inner.backends.iter().any(|b| b.address() == key) {
            return FailureOutcome::NotFound;
        }

        let now = Utc::now();
        for backend in inner.backends.iter_mut().filter(|b| b.address() == key) {
            backend.healthy = false;
            backend.last_checked = Some(now);
        }

        let failures = {
            let counter = inner.failures.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let threshold = inner.remove_after;

        if failures >= threshold {
            remove_first(&mut inner, &key);
            info!(address = %key, failures, "evicted backend after repeated failures");
            FailureOutcome::Evicted
        } else {
            FailureOutcome::Counted { failures, threshold }
        }
    }

    /// Reset the consecutive-failure counter for `address` to zero and
    /// mark its entries healthy. No-op for absent addresses.
    pub fn record_success(&self, address: &str) {
        let key = normalize(address);
        let mut inner = self.lock();
        if let Some(counter) = inner.failures.get_mut(&key) {
            *counter = 0;
        }
        let now = Utc::now();
        for backend in inner.backends.iter_mut().filter(|b| b.address() == key) {
            backend.healthy = true;
            backend.last_checked = Some(now);
        }
    }

    /// Decrement the connection count for `address`, floored at zero.
    pub fn release_connection(&self, address: &str) {
        let key = normalize(address);
        let mut inner = self.lock();
        if let Some(count) = inner.connections.get_mut(&key) {
            *count = count.saturating_sub(1);
        }
    }

    /// Consistent view of the whole pool, one entry per list element.
    pub fn snapshot(&self) -> Vec<BackendSnapshot> {
        let inner = self.lock();
        inner
            .backends
            .iter()
            .map(|backend| BackendSnapshot {
                address: backend.address().to_string(),
                healthy: backend.healthy,
                connections: inner
                    .connections
                    .get(backend.address())
                    .copied()
                    .unwrap_or(0),
                failures: inner.failures.get(backend.address()).copied().unwrap_or(0),
                last_checked: backend.last_checked,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().backends.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn counter_keys(&self) -> (Vec<String>, Vec<String>) {
        let inner = self.lock();
        (
            inner.connections.keys().cloned().collect(),
            inner.failures.keys().cloned().collect(),
        )
    }
}

/// Addresses arrive both raw (from callers) and normalized (from
/// snapshots); parse so "http://x:1" and "http://x:1/" hit the same key.
fn normalize(address: &str) -> String {
    Url::parse(address)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| address.to_string())
}

fn remove_first(inner: &mut PoolInner, key: &str) -> bool {
    let Some(position) = inner.backends.iter().position(|b| b.address() == key) else {
        return false;
    };
    inner.backends.remove(position);
    if !inner.backends.iter().any(|b| b.address() == key) {
        inner.connections.remove(key);
        inner.failures.remove(key);
    }
    true
}
