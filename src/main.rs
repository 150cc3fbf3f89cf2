// src/main.rs
use anyhow::{Context, Result};
use baton::config::{self, Config, REMOVE_AFTER};
use baton::health::HealthMonitor;
use baton::load_balancer::create_strategy;
use baton::metrics::MetricsRegistry;
use baton::proxy::{Dispatcher, HttpForwarder, ServerPool};
use baton::server::{RequestHandler, ServerBuilder};
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("baton=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;
    log_config(&config);

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    // Resolve the strategy; an unknown name is fatal at startup.
    let strategy = create_strategy(&config.lb_algo).context("invalid lbAlgo in configuration")?;

    // Seed the pool
    let pool = Arc::new(ServerPool::new(strategy, REMOVE_AFTER));
    for server in &config.servers {
        pool.add_backend(server)
            .with_context(|| format!("invalid server address {server:?}"))?;
    }

    // Start the health monitor
    let probe_interval = config.health_check_interval()?;
    let monitor = Arc::new(HealthMonitor::new(
        pool.clone(),
        probe_interval,
        Some(metrics.clone()),
    )?);
    let monitor_task = tokio::spawn(monitor.clone().start());

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone()).await?;
    }

    // Wire the request path
    let forwarder = Arc::new(HttpForwarder::new());
    let dispatcher = Arc::new(
        Dispatcher::new(pool.clone(), forwarder, config.max_retries).with_metrics(metrics),
    );
    let handler = RequestHandler::new(dispatcher);

    // Start main server
    let addr = config.listen_addr()?;
    info!("Starting load balancer on {}", addr);

    let server = ServerBuilder::new(addr).with_handler(handler).bind().await?;

    tokio::select! {
        result = server.serve() => {
            if let Err(err) = result {
                error!(%err, "server error");
            }
        }
        _ = shutdown_signal() => {}
    }

    monitor.shutdown();
    let _ = monitor_task.await;
    Ok(())
}

fn log_config(config: &Config) {
    info!("port: {}", config.port);
    info!("healthCheckInterval: {}", config.health_check_interval);
    info!("servers: {:?}", config.servers);
    info!("lbAlgo: {}", config.lb_algo);
    info!("maxRetries: {}", config.max_retries);
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let mut response = if req.uri().path() == path.as_str() {
                        let mut resp = Response::new(Body::from(registry.gather()));
                        resp.headers_mut().insert(
                            hyper::header::CONTENT_TYPE,
                            hyper::header::HeaderValue::from_static(
                                "text/plain; version=0.0.4",
                            ),
                        );
                        resp
                    } else {
                        let mut resp = Response::new(Body::from("Not Found"));
                        *resp.status_mut() = StatusCode::NOT_FOUND;
                        resp
                    };
                    *response.version_mut() = req.version();
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = hyper::Server::bind(&addr).serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
