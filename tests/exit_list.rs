//! Exit relay list refresh against a mock list source.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{guard_with, request_from, start_mock_backend, start_programmable_backend, MockResponse};
use request_guard::clock::ManualClock;
use request_guard::config::{AnonymityConfig, GuardConfig};
use request_guard::security::{ExitNodeCache, ExitNodeRefresher, RefreshError, RejectionKind};
use tokio::sync::broadcast;

const LIST: &str = "\
ExitNode 0011BD2485AD45D984EC4159C88FC066E5E3300E
Published 2024-05-01 12:00:00
ExitAddress 185.220.101.4 2024-05-01 13:05:11
ExitNode 0111BA9B604669E636FFD5B503F382A4B7AD6E80
ExitAddress 162.247.74.201 2024-05-01 12:40:02
";

fn anonymity(addr: std::net::SocketAddr, timeout_secs: u64) -> AnonymityConfig {
    AnonymityConfig {
        enabled: true,
        list_url: format!("http://{addr}/exit-addresses"),
        refresh_interval_secs: 3600,
        fetch_timeout_secs: timeout_secs,
    }
}

fn refresher(config: &AnonymityConfig, cache: Arc<ExitNodeCache>) -> ExitNodeRefresher {
    ExitNodeRefresher::new(config, cache, Arc::new(ManualClock::new(77_000)))
}

#[tokio::test]
async fn test_refresh_populates_cache_and_blocks() {
    let addr = start_mock_backend(MockResponse::ok(LIST)).await;
    let mut config = GuardConfig::default();
    config.anonymity = anonymity(addr, 5);
    let (guard, _) = guard_with(config.clone());

    let count = refresher(&config.anonymity, guard.exit_nodes().clone())
        .refresh_once()
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(guard.exit_nodes().last_refresh_ms(), 77_000);

    let relay = request_from("185.220.101.4", "GET", "/");
    assert_eq!(guard.run_pipeline(&relay, None).kind(), Some(RejectionKind::Forbidden));
    assert!(guard.run_pipeline(&request_from("198.51.100.1", "GET", "/"), None).is_admitted());
}

#[tokio::test]
async fn test_timeout_fails_open() {
    let addr = start_mock_backend(MockResponse::ok(LIST).delayed(Duration::from_secs(3))).await;
    let mut config = GuardConfig::default();
    config.anonymity = anonymity(addr, 1);
    let (guard, _) = guard_with(config.clone());

    let err = refresher(&config.anonymity, guard.exit_nodes().clone())
        .refresh_once()
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::Timeout(_)));

    let req = request_from("198.51.100.2", "GET", "/");
    assert!(guard.check_anonymity("198.51.100.2", &req).is_admitted());
    assert!(guard.list_attacks().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_good_list() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let addr = start_programmable_backend(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            match n {
                0 => MockResponse::ok(LIST),
                1 => MockResponse::status(500),
                _ => MockResponse::ok("# nothing published\n"),
            }
        }
    })
    .await;

    let cache = Arc::new(ExitNodeCache::new());
    let refresher = refresher(&anonymity(addr, 5), cache.clone());

    assert_eq!(refresher.refresh_once().await.unwrap(), 2);
    assert!(matches!(refresher.refresh_once().await, Err(RefreshError::Status(500))));
    assert!(matches!(refresher.refresh_once().await, Err(RefreshError::Empty)));

    assert_eq!(cache.len(), 2);
    assert!(cache.contains("162.247.74.201"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unreachable_source() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let cache = Arc::new(ExitNodeCache::new());
    let err = refresher(&anonymity(addr, 2), cache.clone())
        .refresh_once()
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::Transport(_)));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_run_refreshes_then_stops_on_shutdown() {
    let addr = start_mock_backend(MockResponse::ok(LIST)).await;
    let cache = Arc::new(ExitNodeCache::new());
    let refresher = refresher(&anonymity(addr, 5), cache.clone());

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(refresher.run(rx));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while cache.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(cache.len(), 2);

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}
