// src/health/monitor.rs
use crate::metrics::MetricsCollector;
use crate::proxy::{FailureOutcome, ServerPool};
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Upper bound on a single probe, also capped by the tick interval so a
/// slow backend cannot push one tick into the next.
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The periodic prober. On each tick it snapshots the pool, sends every
/// backend a HEAD request, and feeds the outcomes back through the
/// pool's record operations, which is where eviction happens once a
/// backend crosses the consecutive-failure threshold.
pub struct HealthMonitor {
    pool: Arc<ServerPool>,
    interval: Duration,
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ProbeResult {
    pub address: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthMonitor {
    pub fn new(
        pool: Arc<ServerPool>,
        probe_interval: Duration,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let timeout = probe_interval.min(MAX_PROBE_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build health probe client")?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            pool,
            interval: probe_interval,
            client,
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Run until `shutdown` is called. Never returns under normal
    /// operation.
    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(interval = ?self.interval, "starting health monitor");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One tick: probe every backend in the current pool snapshot,
    /// concurrently, and record each outcome.
    pub async fn probe_all(&self) {
        let backends = self.pool.snapshot();
        let mut tasks = Vec::with_capacity(backends.len());

        for backend in backends {
            let client = self.client.clone();
            tasks.push(tokio::spawn(async move {
                probe(client, backend.address).await
            }));
        }

        let results = futures::future::join_all(tasks).await;

        let mut healthy_count = 0usize;
        let mut unhealthy_count = 0usize;

        for joined in results {
            let result = match joined {
                Ok(result) => result,
                Err(err) => {
                    error!(%err, "probe task failed");
                    continue;
                }
            };

            if result.healthy {
                healthy_count += 1;
                debug!(
                    address = %result.address,
                    elapsed_ms = result.response_time_ms,
                    "backend healthy"
                );
                self.pool.record_success(&result.address);
            } else {
                unhealthy_count += 1;
                match self.pool.record_failure(&result.address) {
                    FailureOutcome::Counted { failures, threshold } => {
                        warn!(
                            address = %result.address,
                            failures,
                            threshold,
                            error = ?result.error,
                            "backend failed health probe"
                        );
                    }
                    FailureOutcome::Evicted => {
                        warn!(
                            address = %result.address,
                            "backend evicted after repeated probe failures"
                        );
                    }
                    FailureOutcome::NotFound => {
                        debug!(
                            address = %result.address,
                            "backend removed before probe outcome landed"
                        );
                    }
                }
            }

            if let Some(metrics) = &self.metrics {
                metrics.update_backend_health(&result.address, result.healthy);
            }
        }

        if let Some(metrics) = &self.metrics {
            let snapshot = self.pool.snapshot();
            let healthy = snapshot.iter().filter(|b| b.healthy).count();
            metrics.update_backend_counts(healthy, snapshot.len());
        }

        info!(
            healthy = healthy_count,
            unhealthy = unhealthy_count,
            "health check complete"
        );
    }
}

/// HEAD the backend's address. Metadata-only: the response body is never
/// downloaded. Only an exact 200 counts as alive.
async fn probe(client: Client, address: String) -> ProbeResult {
    let start = Instant::now();
    let outcome = client.head(&address).send().await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    let (healthy, error) = match outcome {
        Ok(response) if response.status() == reqwest::StatusCode::OK => (true, None),
        Ok(response) => (false, Some(format!("HTTP {}", response.status()))),
        Err(err) => (false, Some(err.to_string())),
    };

    ProbeResult {
        address,
        healthy,
        response_time_ms,
        error,
    }
}
