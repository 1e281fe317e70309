//! End-to-end tests for the gateway multiplexing core.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use fastcgi_gateway::config::{DialPolicy, GatewayConfig, LocationConfig};
use fastcgi_gateway::mux::WorkerId;
use fastcgi_gateway::net::Transport;
use fastcgi_gateway::{ContextRegistry, GatewayError, Shutdown, Worker};

mod common;

fn gateway_config(workers: u16, capacity: u32, locations: Vec<LocationConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.workers = workers;
    config.request_capacity = capacity;
    config.locations = locations;
    config
}

fn location(name: &str, addr: &str, dial: DialPolicy) -> LocationConfig {
    LocationConfig {
        name: name.into(),
        address: addr.into(),
        dial,
        connect_timeout_secs: 1,
    }
}

#[tokio::test]
async fn test_full_request_flow() {
    let (addr, accepted) = common::start_mock_backend().await;
    let config = gateway_config(
        4,
        100,
        vec![location("app", &addr.to_string(), DialPolicy::Lazy)],
    );

    let registry = ContextRegistry::init(&config).unwrap();
    assert_eq!(registry.capacity(), 128);

    let mut worker = Worker::attach(&registry).unwrap();
    let ctx = worker.context_mut();
    let loc = ctx.location_id("app").unwrap();

    // Worker 0's first request gets the first id of its range.
    let slot = ctx.begin_request(loc).unwrap();
    assert_eq!(slot.as_u16(), 1);

    // Stream a body chunk through the dedicated connection.
    {
        let chunk = ctx.acquire_chunk(slot, 1024).unwrap();
        chunk.extend_from_slice(b"FCGI body bytes");
    }
    let conn = ctx.connection(slot).await.unwrap();
    match conn.transport().await.unwrap() {
        Transport::Tcp(stream) => stream.write_all(b"FCGI body bytes").await.unwrap(),
        #[cfg(unix)]
        Transport::Unix(_) => panic!("expected a tcp transport"),
    }

    ctx.end_request(slot).unwrap();
    assert_eq!(ctx.in_flight(), 0);
    assert_eq!(ctx.idle_chunks(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_worker_three_first_slot_id() {
    let (addr, _accepted) = common::start_mock_backend().await;
    let config = gateway_config(
        4,
        100,
        vec![location("app", &addr.to_string(), DialPolicy::Lazy)],
    );

    let registry = ContextRegistry::init(&config).unwrap();
    let mut ctx = registry.claim(WorkerId::new(3)).unwrap();
    let loc = ctx.location_id("app").unwrap();
    assert_eq!(ctx.begin_request(loc).unwrap().as_u16(), 385);
}

#[tokio::test]
async fn test_eager_dial_connects_every_worker() {
    let (addr, accepted) = common::start_mock_backend().await;
    let config = gateway_config(
        3,
        8,
        vec![location("app", &addr.to_string(), DialPolicy::Eager)],
    );

    let registry = ContextRegistry::init(&config).unwrap();
    for _ in 0..3 {
        let mut worker = Worker::attach(&registry).unwrap();
        worker.start().await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    // One independent connection per (location, worker) pair.
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_workers_run_and_shut_down() {
    let (addr, _accepted) = common::start_mock_backend().await;
    let config = gateway_config(
        2,
        8,
        vec![location("app", &addr.to_string(), DialPolicy::Eager)],
    );

    let registry = Arc::new(ContextRegistry::init(&config).unwrap());
    let shutdown = Shutdown::new();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let registry = Arc::clone(&registry);
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let worker = Worker::attach(&registry).unwrap();
            worker.run(rx).await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();
    for task in tasks {
        task.await.unwrap();
    }

    // Both identities and both contexts are spoken for.
    assert!(matches!(
        registry.assign_worker_id(),
        Err(GatewayError::Exhausted { .. })
    ));
    assert!(matches!(
        registry.claim(WorkerId::new(0)),
        Err(GatewayError::Missing { .. })
    ));
}

#[tokio::test]
async fn test_broken_backend_is_scoped_to_the_request() {
    // One live location and one that refuses connections.
    let (good_addr, _accepted) = common::start_mock_backend().await;
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let config = gateway_config(
        1,
        8,
        vec![
            location("good", &good_addr.to_string(), DialPolicy::Lazy),
            location("dead", &dead_addr.to_string(), DialPolicy::Lazy),
        ],
    );

    let registry = ContextRegistry::init(&config).unwrap();
    let mut ctx = registry.claim(WorkerId::new(0)).unwrap();
    let good = ctx.location_id("good").unwrap();
    let dead = ctx.location_id("dead").unwrap();

    let failing = ctx.begin_request(dead).unwrap();
    assert!(matches!(
        ctx.connection(failing).await,
        Err(GatewayError::Connection { .. })
    ));
    ctx.abort_request(failing, false).unwrap();

    // The failure never touched the other location or the slot table.
    let ok = ctx.begin_request(good).unwrap();
    ctx.connection(ok).await.unwrap();
    ctx.end_request(ok).unwrap();
    assert_eq!(ctx.in_flight(), 0);
}
