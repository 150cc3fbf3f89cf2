// tests/end_to_end_tests.rs
//
// Full stack on real sockets: a balancer bound to port 0 in front of
// mockito upstreams, exercised through a plain HTTP client.

use baton::load_balancer::create_strategy;
use baton::proxy::{Dispatcher, HttpForwarder, ServerPool, FORWARDED_SERVER_HEADER};
use baton::retry::Backoff;
use baton::server::{RequestHandler, ServerBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_balancer(pool: Arc<ServerPool>, max_retries: u32) -> SocketAddr {
    let forwarder = Arc::new(HttpForwarder::new());
    let dispatcher = Arc::new(
        Dispatcher::new(pool, forwarder, max_retries)
            .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(1))),
    );
    let handler = RequestHandler::new(dispatcher);

    let server = ServerBuilder::new(([127, 0, 0, 1], 0).into())
        .with_handler(handler)
        .bind()
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.serve().await;
    });
    addr
}

fn round_robin_pool(addresses: &[&str]) -> Arc<ServerPool> {
    let pool = Arc::new(ServerPool::new(create_strategy("round-robin").unwrap(), 30));
    for address in addresses {
        pool.add_backend(address).unwrap();
    }
    pool
}

#[tokio::test]
async fn round_robin_rotates_across_requests() {
    let mut one = mockito::Server::new_async().await;
    let _m1 = one
        .mock("GET", "/")
        .with_status(200)
        .with_body("one")
        .create_async()
        .await;
    let mut two = mockito::Server::new_async().await;
    let _m2 = two
        .mock("GET", "/")
        .with_status(200)
        .with_body("two")
        .create_async()
        .await;

    let pool = round_robin_pool(&[&one.url(), &two.url()]);
    let addr = spawn_balancer(pool, 3).await;

    let client = reqwest::Client::new();
    let first = client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    let second = client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();

    let first_backend = first.headers()[FORWARDED_SERVER_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    let second_backend = second.headers()[FORWARDED_SERVER_HEADER]
        .to_str()
        .unwrap()
        .to_string();

    assert_ne!(first_backend, second_backend);
    assert!(first_backend.starts_with(&one.url()));
    assert!(second_backend.starts_with(&two.url()));
    assert_eq!(first.text().await.unwrap(), "one");
    assert_eq!(second.text().await.unwrap(), "two");
}

#[tokio::test]
async fn empty_pool_answers_service_unavailable() {
    let pool = round_robin_pool(&[]);
    let addr = spawn_balancer(pool, 3).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn failing_backend_falls_over_to_the_healthy_one() {
    let mut failing = mockito::Server::new_async().await;
    let _bad = failing
        .mock("GET", "/")
        .with_status(500)
        .create_async()
        .await;
    let mut healthy = mockito::Server::new_async().await;
    let _good = healthy
        .mock("GET", "/")
        .with_status(200)
        .with_body("served")
        .create_async()
        .await;

    // Round-robin tries the failing upstream first, the retry lands on
    // the healthy one.
    let pool = round_robin_pool(&[&failing.url(), &healthy.url()]);
    let addr = spawn_balancer(pool, 3).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers()[FORWARDED_SERVER_HEADER]
        .to_str()
        .unwrap()
        .starts_with(&healthy.url()));
    assert_eq!(response.text().await.unwrap(), "served");
}

#[tokio::test]
async fn exhausted_retries_answer_bad_gateway() {
    let mut failing = mockito::Server::new_async().await;
    let _bad = failing
        .mock("GET", "/")
        .with_status(500)
        .expect_at_least(2)
        .create_async()
        .await;

    let pool = round_robin_pool(&[&failing.url()]);
    let addr = spawn_balancer(pool, 2).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}
