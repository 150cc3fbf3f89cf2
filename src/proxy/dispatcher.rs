// src/proxy/dispatcher.rs
use super::forward::{ForwardError, Forwarder};
use super::pool::ServerPool;
use crate::load_balancer::SelectionError;
use crate::metrics::MetricsCollector;
use crate::retry::Backoff;
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Response header naming the backend that served the request.
pub const FORWARDED_SERVER_HEADER: &str = "x-forwarded-server";

/// Terminal failures of one dispatch run. Per-attempt forward errors
/// are absorbed by the retry loop and only surface here once the loop
/// gives up.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no servers available")]
    NoServersAvailable,

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: ForwardError,
    },

    #[error("failed to read request body: {0}")]
    BadRequestBody(#[source] hyper::Error),
}

impl From<DispatchError> for Response<Body> {
    fn from(err: DispatchError) -> Self {
        let (status, message) = match err {
            DispatchError::NoServersAvailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "no servers available")
            }
            DispatchError::RetriesExhausted { .. } => (StatusCode::BAD_GATEWAY, "retries exhausted"),
            DispatchError::BadRequestBody(_) => {
                (StatusCode::BAD_REQUEST, "failed to read request body")
            }
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response
    }
}

/// Per-request control loop: select a backend, attempt the forward,
/// retry on failure up to the attempt bound. A fresh selection is made
/// on every attempt, so retries spread across the pool under whatever
/// strategy is active.
pub struct Dispatcher {
    pool: Arc<ServerPool>,
    forwarder: Arc<dyn Forwarder>,
    max_retries: u32,
    backoff: Backoff,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(pool: Arc<ServerPool>, forwarder: Arc<dyn Forwarder>, max_retries: u32) -> Self {
        Self {
            pool,
            forwarder,
            max_retries,
            backoff: Backoff::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Result<Response<Body>, DispatchError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch",
            %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );
        self.run(req).instrument(span).await
    }

    async fn run(&self, req: Request<Body>) -> Result<Response<Body>, DispatchError> {
        let (parts, body) = req.into_parts();
        // Buffer the body once so every attempt can replay it.
        let body_bytes = hyper::body::to_bytes(body)
            .await
            .map_err(DispatchError::BadRequestBody)?;

        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let selected = match self.pool.select_backend() {
                Ok(selected) => selected,
                Err(SelectionError::NoServersAvailable) => {
                    warn!("no servers available");
                    self.record_terminal(&parts.method, StatusCode::SERVICE_UNAVAILABLE, start);
                    return Err(DispatchError::NoServersAvailable);
                }
            };
            let address = selected.backend.address().to_string();

            let mut attempt_req = Request::new(Body::from(body_bytes.clone()));
            *attempt_req.method_mut() = parts.method.clone();
            *attempt_req.uri_mut() = parts.uri.clone();
            *attempt_req.version_mut() = parts.version;
            *attempt_req.headers_mut() = parts.headers.clone();

            match self.forwarder.forward(&selected.backend, attempt_req).await {
                Ok(mut response) => {
                    debug!(backend = %address, attempt, status = %response.status(), "request forwarded");
                    if let Ok(value) = HeaderValue::from_str(&address) {
                        response
                            .headers_mut()
                            .insert(FORWARDED_SERVER_HEADER, value);
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_backend_attempt(&address, true);
                        metrics.record_request(
                            parts.method.as_str(),
                            response.status().as_u16(),
                            &address,
                            start.elapsed(),
                        );
                    }
                    return Ok(response);
                }
                Err(err) => {
                    warn!(backend = %address, attempt, error = %err, "forward attempt failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_backend_attempt(&address, false);
                    }
                    // Give the connection count back before pausing.
                    drop(selected);

                    if attempt >= self.max_retries {
                        self.record_terminal(&parts.method, StatusCode::BAD_GATEWAY, start);
                        return Err(DispatchError::RetriesExhausted {
                            attempts: attempt,
                            last_error: err,
                        });
                    }
                    sleep(self.backoff.delay(attempt)).await;
                }
            }
        }
    }

    fn record_terminal(&self, method: &hyper::Method, status: StatusCode, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(method.as_str(), status.as_u16(), "none", start.elapsed());
        }
    }
}
