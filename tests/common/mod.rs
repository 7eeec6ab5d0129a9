//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use route_control::lifecycle::{ControlPlane, Shutdown};
use route_control::provider::ConfigProvider;
use route_control::snapshot::SnapshotBuilder;
use route_control::store::{
    ClusterChanges, ClusterRecord, DestinationInput, EntityStore, HealthCheckSettings, NewCluster,
    NewRoute, RouteRecord, SqlStore, StoreError, StoreResult,
};
use route_control::Settings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn memory_store() -> SqlStore {
    SqlStore::in_memory().await.unwrap()
}

/// Store wrapper whose reads can be switched to fail or slowed down.
pub struct FlakyStore {
    inner: SqlStore,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqlStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Completed or attempted snapshot builds (one per cluster read).
    pub fn builds(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> StoreResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn clusters_with_destinations(&self) -> StoreResult<Vec<ClusterRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.clusters_with_destinations().await
    }

    async fn routes_with_relations(&self) -> StoreResult<Vec<RouteRecord>> {
        self.gate().await?;
        self.inner.routes_with_relations().await
    }
}

pub async fn provider_over(store: Arc<dyn EntityStore>) -> Arc<ConfigProvider> {
    let builder = SnapshotBuilder::new(store, READ_TIMEOUT);
    Arc::new(ConfigProvider::initialize(builder).await.unwrap())
}

pub fn new_cluster(cluster_id: &str, destinations: &[(&str, &str)]) -> NewCluster {
    NewCluster {
        cluster_id: cluster_id.to_string(),
        load_balancing_policy: Some("RoundRobin".to_string()),
        health_check: HealthCheckSettings::default(),
        is_active: true,
        destinations: destinations
            .iter()
            .map(|(id, address)| DestinationInput {
                destination_id: id.to_string(),
                address: Some(address.to_string()),
                is_active: true,
            })
            .collect(),
        actor: Some("tests".to_string()),
    }
}

pub fn new_route(route_id: &str, cluster: Uuid, path: &str) -> NewRoute {
    NewRoute {
        route_id: route_id.to_string(),
        path: path.to_string(),
        methods: vec!["GET".to_string()],
        rate_limiter_policy: None,
        cluster,
        is_active: true,
        headers: Vec::new(),
        transforms: Vec::new(),
        actor: Some("tests".to_string()),
    }
}

/// Flip one destination's active flag, keeping its address.
pub fn toggle_destination(destination_id: &str, active: bool) -> ClusterChanges {
    ClusterChanges {
        destinations: Some(vec![DestinationInput {
            destination_id: destination_id.to_string(),
            address: None,
            is_active: active,
        }]),
        ..Default::default()
    }
}

/// Admin API running on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub store: SqlStore,
    pub provider: Arc<ConfigProvider>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(settings: Settings) -> Self {
        let store = memory_store().await;
        let plane = ControlPlane::prepare_with_store(settings, store.clone())
            .await
            .unwrap();
        let provider = plane.provider.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            plane.run(listener, server_shutdown).await.unwrap();
        });

        Self {
            base_url,
            store,
            provider,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}
