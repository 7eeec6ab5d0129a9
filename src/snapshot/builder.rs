//! Snapshot builder: entity graph in, routing table out.
//!
//! # Responsibilities
//! - Read clusters and routes from the store in two bounded passes
//! - Keep only active, well-formed entries
//! - Cascade exclusions from destinations to clusters to routes
//!
//! # Design Decisions
//! - `assemble` is a pure function so every filtering rule is unit-testable
//!   without a database
//! - Anomalies are warnings and counters, never errors; only a failed read
//!   fails a build

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::snapshot::types::{
    ClusterConfig, DestinationConfig, HeaderMatch, HeaderMatchMode, RouteConfig, RouteMatch,
    RoutingTable, HEALTH_ENABLED_KEY, HEALTH_INTERVAL_KEY, HEALTH_PATH_KEY, HEALTH_TIMEOUT_KEY,
    PATH_PATTERN_KEY,
};
use crate::store::{ClusterRecord, EntityStore, HealthCheckSettings, RouteRecord, StoreError};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("entity store read failed: {0}")]
    Store(#[from] StoreError),

    #[error("{stage} read timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

/// What the builder left out, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Active clusters dropped for having no live destination.
    pub excluded_clusters: Vec<String>,
    /// `(cluster_id, destination_id)` of active destinations without a usable address.
    pub dropped_destinations: Vec<(String, String)>,
    /// Active routes whose cluster is absent, inactive, or excluded.
    pub dangling_routes: Vec<String>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.excluded_clusters.is_empty()
            && self.dropped_destinations.is_empty()
            && self.dangling_routes.is_empty()
    }
}

/// Reads the entity graph and produces routing tables.
#[derive(Clone)]
pub struct SnapshotBuilder {
    store: Arc<dyn EntityStore>,
    read_timeout: Duration,
}

impl SnapshotBuilder {
    pub fn new(store: Arc<dyn EntityStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Run both read passes and assemble the table.
    ///
    /// The passes are separate statements; a cluster changed between them
    /// surfaces as a dangling route and is dropped.
    pub async fn build(&self) -> Result<(RoutingTable, BuildReport), BuildError> {
        let clusters = tokio::time::timeout(self.read_timeout, self.store.clusters_with_destinations())
            .await
            .map_err(|_| BuildError::Timeout {
                stage: "clusters",
                after: self.read_timeout,
            })??;

        let routes = tokio::time::timeout(self.read_timeout, self.store.routes_with_relations())
            .await
            .map_err(|_| BuildError::Timeout {
                stage: "routes",
                after: self.read_timeout,
            })??;

        Ok(assemble(clusters, routes))
    }
}

/// Apply the snapshot rules to raw records.
pub fn assemble(
    mut clusters: Vec<ClusterRecord>,
    mut routes: Vec<RouteRecord>,
) -> (RoutingTable, BuildReport) {
    clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    routes.sort_by(|a, b| a.route_id.cmp(&b.route_id));

    let mut report = BuildReport::default();
    let mut live: HashSet<String> = HashSet::new();
    let mut cluster_configs = Vec::new();

    for cluster in clusters.iter().filter(|c| c.is_active) {
        let mut destinations = BTreeMap::new();
        for destination in cluster.active_destinations() {
            match usable_address(destination.address.as_deref()) {
                Some(address) => {
                    destinations.insert(
                        destination.destination_id.clone(),
                        DestinationConfig { address },
                    );
                }
                None => {
                    tracing::warn!(
                        cluster_id = %cluster.cluster_id,
                        destination_id = %destination.destination_id,
                        address = ?destination.address,
                        "Destination has no usable address, dropped"
                    );
                    report.dropped_destinations.push((
                        cluster.cluster_id.clone(),
                        destination.destination_id.clone(),
                    ));
                }
            }
        }

        if destinations.is_empty() {
            tracing::warn!(
                cluster_id = %cluster.cluster_id,
                "Cluster has no live destinations, excluded from snapshot"
            );
            report.excluded_clusters.push(cluster.cluster_id.clone());
            continue;
        }

        live.insert(cluster.cluster_id.clone());
        cluster_configs.push(ClusterConfig {
            cluster_id: cluster.cluster_id.clone(),
            load_balancing_policy: cluster.load_balancing_policy.clone(),
            destinations,
            metadata: health_metadata(&cluster.health_check),
        });
    }

    let mut route_configs = Vec::new();
    for route in routes.into_iter().filter(|r| r.is_active) {
        let cluster_id = match &route.cluster {
            Some(cluster) if cluster.is_active && live.contains(&cluster.cluster_id) => {
                cluster.cluster_id.clone()
            }
            other => {
                tracing::warn!(
                    route_id = %route.route_id,
                    cluster_id = ?other.as_ref().map(|c| c.cluster_id.as_str()),
                    "Route target cluster is not in the snapshot, route dropped"
                );
                report.dangling_routes.push(route.route_id);
                continue;
            }
        };

        let headers = route
            .headers
            .iter()
            .filter(|h| h.is_active)
            .map(|h| HeaderMatch {
                name: h.name.clone(),
                values: h.values.clone(),
                mode: HeaderMatchMode::parse_lenient(&h.mode),
                is_case_sensitive: true,
            })
            .collect();

        let mut transforms: Vec<_> = route.transforms.iter().filter(|t| t.is_active).collect();
        transforms.sort_by_key(|t| t.sort_order);
        let transforms = transforms
            .into_iter()
            .map(|t| BTreeMap::from([(PATH_PATTERN_KEY.to_string(), t.path_pattern.clone())]))
            .collect();

        route_configs.push(RouteConfig {
            route_id: route.route_id,
            cluster_id,
            route_match: RouteMatch {
                path: route.path,
                methods: normalize_methods(&route.methods),
                headers,
            },
            transforms,
            rate_limiter_policy: route.rate_limiter_policy,
        });
    }

    (
        RoutingTable {
            clusters: cluster_configs,
            routes: route_configs,
        },
        report,
    )
}

/// Trimmed address if it parses as an absolute URL with a host.
fn usable_address(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => Some(trimmed.to_string()),
        _ => None,
    }
}

fn health_metadata(settings: &HealthCheckSettings) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if !settings.enabled {
        return metadata;
    }
    metadata.insert(HEALTH_ENABLED_KEY.to_string(), "true".to_string());
    if let Some(path) = &settings.path {
        metadata.insert(HEALTH_PATH_KEY.to_string(), path.clone());
    }
    metadata.insert(HEALTH_INTERVAL_KEY.to_string(), settings.interval_secs.to_string());
    metadata.insert(HEALTH_TIMEOUT_KEY.to_string(), settings.timeout_secs.to_string());
    metadata
}

fn normalize_methods(methods: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    methods
        .iter()
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty() && seen.insert(m.clone()))
        .collect()
}
