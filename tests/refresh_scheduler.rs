//! Periodic refresh against real time with short intervals.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{memory_store, new_cluster, provider_over, FlakyStore};
use route_control::refresh::RefreshScheduler;
use route_control::Shutdown;

const INTERVAL: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_ticks_publish_new_revisions() {
    let store = memory_store().await;
    let provider = provider_over(Arc::new(store.clone())).await;
    let shutdown = Shutdown::new();
    let handle = RefreshScheduler::new(provider.clone(), INTERVAL).spawn(shutdown.subscribe());

    store
        .create_cluster(new_cluster("c1", &[("d1", "http://h1:80")]))
        .await
        .unwrap();
    tokio::time::sleep(INTERVAL * 5).await;

    let snapshot = provider.get_config();
    assert!(snapshot.revision >= 3, "revision {}", snapshot.revision);
    assert!(snapshot.table.cluster("c1").is_some());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_first_tick_waits_one_interval() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store);
    let provider = provider_over(flaky.clone()).await;
    let shutdown = Shutdown::new();
    let handle =
        RefreshScheduler::new(provider.clone(), Duration::from_secs(60)).spawn(shutdown.subscribe());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(flaky.builds(), 1);
    assert_eq!(provider.revision(), 1);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_failing_ticks_do_not_stop_the_loop() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let provider = provider_over(flaky.clone()).await;
    let before = provider.get_config();

    flaky.set_failing(true);
    let shutdown = Shutdown::new();
    let handle = RefreshScheduler::new(provider.clone(), INTERVAL).spawn(shutdown.subscribe());

    tokio::time::sleep(INTERVAL * 4).await;
    assert!(flaky.builds() >= 3);
    assert!(Arc::ptr_eq(&before, &provider.get_config()));
    assert!(provider.last_failure().is_some());

    store
        .create_cluster(new_cluster("c1", &[("d1", "http://h1:80")]))
        .await
        .unwrap();
    flaky.set_failing(false);
    tokio::time::sleep(INTERVAL * 4).await;

    let snapshot = provider.get_config();
    assert!(snapshot.revision > before.revision);
    assert!(snapshot.table.cluster("c1").is_some());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_refresh_finish() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store);
    let provider = provider_over(flaky.clone()).await;

    flaky.set_delay(Duration::from_millis(200));
    let shutdown = Shutdown::new();
    let handle = RefreshScheduler::new(provider.clone(), Duration::from_millis(20))
        .spawn(shutdown.subscribe());

    // First tick fires at 20ms and its build is still sleeping at 80ms.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(provider.revision(), 1);
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(provider.revision(), 2);
}
