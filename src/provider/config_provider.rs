//! Process-wide owner of the live routing snapshot.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::observability::metrics as refresh_metrics;
use crate::provider::change_token::ChangeToken;
use crate::snapshot::{BuildError, BuildReport, ClusterConfig, RouteConfig, RoutingTable, SnapshotBuilder};

/// What asked for a rebuild. Used for log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// Initial build at process start.
    Startup,
    /// Background scheduler tick.
    Scheduled,
    /// Entity write through the admin services.
    OnDemand,
    /// Operator-invoked force refresh.
    Manual,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Startup => "startup",
            RefreshTrigger::Scheduled => "scheduled",
            RefreshTrigger::OnDemand => "on_demand",
            RefreshTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, published routing table.
#[derive(Debug, Serialize)]
pub struct RoutingSnapshot {
    /// Starts at 1 and increases by one per successful update.
    pub revision: u64,
    pub built_at: DateTime<Utc>,
    #[serde(flatten)]
    pub table: RoutingTable,
    #[serde(skip)]
    change_token: ChangeToken,
}

impl RoutingSnapshot {
    fn new(revision: u64, table: RoutingTable) -> Self {
        Self {
            revision,
            built_at: Utc::now(),
            table,
            change_token: ChangeToken::new(),
        }
    }

    pub fn clusters(&self) -> &[ClusterConfig] {
        &self.table.clusters
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.table.routes
    }

    /// Fires when this snapshot is superseded.
    pub fn change_token(&self) -> &ChangeToken {
        &self.change_token
    }
}

/// The last update that did not publish.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub at: DateTime<Utc>,
    pub trigger: RefreshTrigger,
    pub reason: String,
}

/// Read boundary for a proxy engine.
pub trait RoutingConfigSource: Send + Sync {
    /// Latest published snapshot. Never blocks.
    fn get_config(&self) -> Arc<RoutingSnapshot>;

    /// Token of the snapshot current at call time.
    fn change_token(&self) -> ChangeToken {
        self.get_config().change_token().clone()
    }
}

/// Owns the current snapshot and serializes rebuilds.
///
/// A value of this type only exists once the first build succeeded, so
/// readers can never observe an empty provider.
pub struct ConfigProvider {
    builder: SnapshotBuilder,
    current: ArcSwap<RoutingSnapshot>,
    update_lock: tokio::sync::Mutex<()>,
    last_failure: Mutex<Option<RefreshFailure>>,
}

impl ConfigProvider {
    /// Run the first build. Failure here means the process has no routing
    /// table and must not start.
    pub async fn initialize(builder: SnapshotBuilder) -> Result<Self, BuildError> {
        let started = Instant::now();
        let trigger = RefreshTrigger::Startup;

        let (table, report) = match builder.build().await {
            Ok(built) => built,
            Err(e) => {
                refresh_metrics::record_refresh(trigger.as_str(), false, started.elapsed().as_secs_f64());
                tracing::error!(trigger = %trigger, error = %e, "Initial routing config build failed");
                return Err(e);
            }
        };

        let snapshot = Arc::new(RoutingSnapshot::new(1, table));
        publish_metrics(trigger, started, &snapshot, &report);
        tracing::info!(
            revision = snapshot.revision,
            clusters = snapshot.clusters().len(),
            routes = snapshot.routes().len(),
            "Routing config initialized"
        );

        Ok(Self {
            builder,
            current: ArcSwap::new(snapshot),
            update_lock: tokio::sync::Mutex::new(()),
            last_failure: Mutex::new(None),
        })
    }

    /// Latest published snapshot. Lock-free.
    pub fn get_config(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.current.load().revision
    }

    /// The latest update's failure. Cleared by the next successful update.
    pub fn last_failure(&self) -> Option<RefreshFailure> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild from the store and publish.
    ///
    /// Callers queue on an internal lock; each performs its own full build
    /// once it holds the lock, so a caller's result always reflects writes
    /// committed before it called. On failure the current snapshot stays
    /// and no token fires.
    pub async fn update(&self, trigger: RefreshTrigger) -> Result<Arc<RoutingSnapshot>, BuildError> {
        let _guard = self.update_lock.lock().await;
        let started = Instant::now();

        let (table, report) = match self.builder.build().await {
            Ok(built) => built,
            Err(e) => {
                refresh_metrics::record_refresh(trigger.as_str(), false, started.elapsed().as_secs_f64());
                tracing::error!(
                    trigger = %trigger,
                    revision = self.revision(),
                    error = %e,
                    "Routing config refresh failed, keeping current snapshot"
                );
                *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(RefreshFailure {
                    at: Utc::now(),
                    trigger,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let previous = self.current.load_full();
        let next = Arc::new(RoutingSnapshot::new(previous.revision + 1, table));
        self.current.store(next.clone());
        previous.change_token.fire();
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        publish_metrics(trigger, started, &next, &report);
        tracing::info!(
            trigger = %trigger,
            revision = next.revision,
            clusters = next.clusters().len(),
            routes = next.routes().len(),
            "Routing config refreshed"
        );

        Ok(next)
    }
}

impl RoutingConfigSource for ConfigProvider {
    fn get_config(&self) -> Arc<RoutingSnapshot> {
        ConfigProvider::get_config(self)
    }
}

impl fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("revision", &self.revision())
            .finish()
    }
}

fn publish_metrics(
    trigger: RefreshTrigger,
    started: Instant,
    snapshot: &RoutingSnapshot,
    report: &BuildReport,
) {
    refresh_metrics::record_refresh(trigger.as_str(), true, started.elapsed().as_secs_f64());
    refresh_metrics::record_snapshot(snapshot.revision, snapshot.clusters().len(), snapshot.routes().len());
    refresh_metrics::record_exclusions(report);
}
