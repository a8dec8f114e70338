//! End-to-end polling: scheduler, poll job and ingestor over in-memory stores.
//!
//! Run with: cargo test --test poll_pipeline_integration

use std::sync::Arc;
use std::time::Duration;

use domain::models::{ProviderCredentials, SessionToken, FIX_RETENTION};
use domain::services::ports::{FixResponse, SessionStore};
use domain::services::{LocationIngestor, MemoryTrackerStore, MockLocationProvider};
use geo_tracker::config::PollerConfig;
use geo_tracker::jobs::{JobScheduler, PollDevicesJob};

fn poller_config() -> PollerConfig {
    PollerConfig {
        default_interval_secs: 30,
        max_concurrent_ingestions: 4,
        run_on_start: true,
    }
}

fn scheduler_for(
    store: &Arc<MemoryTrackerStore>,
    provider: &Arc<MockLocationProvider>,
) -> JobScheduler {
    let ingestor = Arc::new(LocationIngestor::new(
        provider.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let mut scheduler = JobScheduler::new();
    scheduler.register(PollDevicesJob::new(
        store.clone(),
        ingestor,
        store.clone(),
        &poller_config(),
    ));
    scheduler
}

#[tokio::test]
async fn test_repeated_cycles_keep_history_bounded() {
    let store = Arc::new(MemoryTrackerStore::new());
    let provider = Arc::new(MockLocationProvider::new());
    store.set_poll_interval(Some(Duration::from_millis(20))).await;

    let device = store
        .add_device(
            Some("+421900000001"),
            Some(ProviderCredentials::new("356000000000001", "secret")),
            true,
        )
        .await;

    let mut scheduler = scheduler_for(&store, &provider);
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(2)).await;
    // Let the last dispatched ingestion finish.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fixes = store.fixes_for(device.id).await;
    assert!(provider.fetch_calls() as i64 > FIX_RETENTION);
    assert_eq!(fixes.len() as i64, FIX_RETENTION);
    // The first cycle logs in and later cycles reuse the cached session.
    assert_eq!(provider.login_calls(), 1);
}

#[tokio::test]
async fn test_invalidated_session_is_renewed_and_cached() {
    let store = Arc::new(MemoryTrackerStore::new());
    let provider = Arc::new(MockLocationProvider::new());
    store.set_poll_interval(Some(Duration::from_secs(60))).await;

    let device = store
        .add_device(
            Some("+421900000002"),
            Some(ProviderCredentials::new("356000000000002", "secret")),
            true,
        )
        .await;
    store
        .save_session(device.id, &SessionToken::new("PHPSESSID=stale"))
        .await
        .unwrap();
    provider.push_fix(Ok(FixResponse::SessionInvalid)).await;
    provider
        .push_login(Ok(SessionToken::new("PHPSESSID=fresh")))
        .await;

    let mut scheduler = scheduler_for(&store, &provider);
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(2)).await;

    assert_eq!(
        provider.fetch_tokens().await,
        vec!["PHPSESSID=stale".to_string(), "PHPSESSID=fresh".to_string()]
    );
    assert_eq!(
        store.load_session(device.id).await.unwrap(),
        Some(SessionToken::new("PHPSESSID=fresh"))
    );
    assert_eq!(store.fixes_for(device.id).await.len(), 1);
}

#[tokio::test]
async fn test_devices_without_credentials_are_never_polled() {
    let store = Arc::new(MemoryTrackerStore::new());
    let provider = Arc::new(MockLocationProvider::new());
    store.set_poll_interval(Some(Duration::from_secs(60))).await;

    let device = store.add_device(Some("+421900000003"), None, true).await;

    let mut scheduler = scheduler_for(&store, &provider);
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(2)).await;

    assert_eq!(provider.login_calls(), 0);
    assert!(store.fixes_for(device.id).await.is_empty());
}
