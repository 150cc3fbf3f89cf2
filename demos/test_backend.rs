//! demos/test_backend.rs
//! A toy upstream for exercising the balancer locally.
//! Run: cargo run --example test_backend -- <port> [name] [fail_pct]
//!
//! Serves JSON on every path, answers /health, and flips its health
//! flag on POST /toggle so eviction can be demonstrated by hand.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use rand::Rng;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

#[derive(Clone)]
struct BackendState {
    port: u16,
    name: String,
    req_counter: Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
    fail_pct: f64,
}

async fn handle(
    req: Request<Body>,
    state: BackendState,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();

    if path == "/health" {
        return Ok(if state.healthy_flag.load(Ordering::SeqCst) {
            Response::new(Body::from("OK"))
        } else {
            let mut resp = Response::new(Body::from("Unhealthy"));
            *resp.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            resp
        });
    }

    if path == "/toggle" && req.method() == Method::POST {
        let now = !state.healthy_flag.load(Ordering::SeqCst);
        state.healthy_flag.store(now, Ordering::SeqCst);
        return Ok(Response::new(Body::from(format!("healthy={now}"))));
    }

    if !state.healthy_flag.load(Ordering::SeqCst) {
        let mut resp = Response::new(Body::from("Down"));
        *resp.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return Ok(resp);
    }

    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;

    if state.fail_pct > 0.0 && rand::thread_rng().gen_bool(state.fail_pct / 100.0) {
        let mut resp = Response::new(Body::from("Injected failure"));
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return Ok(resp);
    }

    let body = format!(
        r#"{{"backend":"{}","port":{},"req":{},"path":"{}"}}"#,
        state.name, state.port, n, path
    );

    let mut resp = Response::new(Body::from(body));
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(resp)
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5001);
    let name = args.next().unwrap_or_else(|| format!("backend-{port}"));
    let fail_pct: f64 = args.next().and_then(|p| p.parse().ok()).unwrap_or(0.0);

    let state = BackendState {
        port,
        name: name.clone(),
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
        fail_pct,
    };

    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone())))
        }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    println!("{name} listening on http://{addr} (fail_pct={fail_pct})");

    if let Err(err) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("server error: {err}");
    }
}
