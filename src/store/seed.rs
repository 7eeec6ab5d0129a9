//! First-start import of entities from settings.
//!
//! Runs only against an empty database, before the provider exists, so it
//! writes through the store directly. Entries that would be rejected by the
//! services are skipped with a warning rather than failing startup.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::{SeedCluster, SeedConfig, SeedRoute};
use crate::services::validation::{validate_new_cluster, validate_new_route};
use crate::store::{
    DestinationInput, HealthCheckSettings, NewCluster, NewRoute, SqlStore,
    StoreError, StoreResult,
};

const SEED_ACTOR: &str = "seed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub clusters: usize,
    pub routes: usize,
    pub skipped: usize,
}

/// Import `seed` if the store holds no clusters and no routes.
///
/// Returns `None` when the store already had data.
pub async fn seed_if_empty(store: &SqlStore, seed: &SeedConfig) -> StoreResult<Option<SeedSummary>> {
    if store.has_any_config().await? {
        tracing::debug!("Store already holds routing entities, seeding skipped");
        return Ok(None);
    }
    if seed.clusters.is_empty() && seed.routes.is_empty() {
        return Ok(Some(SeedSummary::default()));
    }

    let mut summary = SeedSummary::default();
    let mut created: HashMap<String, Uuid> = HashMap::new();

    for entry in &seed.clusters {
        let Some(request) = cluster_request(entry) else {
            summary.skipped += 1;
            continue;
        };
        if let Err(e) = validate_new_cluster(&request) {
            tracing::warn!(cluster_id = %entry.cluster_id, error = %e, "Seed cluster rejected");
            summary.skipped += 1;
            continue;
        }

        match store.create_cluster(request).await {
            Ok(cluster) => {
                created.insert(cluster.cluster_id.clone(), cluster.id);
                summary.clusters += 1;
            }
            Err(e @ StoreError::Conflict { .. }) => {
                tracing::warn!(cluster_id = %entry.cluster_id, error = %e, "Seed cluster skipped");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for entry in &seed.routes {
        let Some(cluster) = created.get(&entry.cluster_id).copied() else {
            tracing::warn!(
                route_id = %entry.route_id,
                cluster_id = %entry.cluster_id,
                "Seed route references an unknown cluster, skipped"
            );
            summary.skipped += 1;
            continue;
        };

        let request = route_request(entry, cluster);
        if let Err(e) = validate_new_route(&request) {
            tracing::warn!(route_id = %entry.route_id, error = %e, "Seed route rejected");
            summary.skipped += 1;
            continue;
        }

        match store.create_route(request).await {
            Ok(_) => summary.routes += 1,
            Err(e @ StoreError::Conflict { .. }) => {
                tracing::warn!(route_id = %entry.route_id, error = %e, "Seed route skipped");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        clusters = summary.clusters,
        routes = summary.routes,
        skipped = summary.skipped,
        "Seeded routing entities"
    );
    Ok(Some(summary))
}

/// `None` when no destination with an address remains.
fn cluster_request(entry: &SeedCluster) -> Option<NewCluster> {
    let destinations: Vec<DestinationInput> = entry
        .destinations
        .iter()
        .filter_map(|d| {
            if d.address.trim().is_empty() {
                tracing::warn!(
                    cluster_id = %entry.cluster_id,
                    destination_id = %d.destination_id,
                    "Seed destination has no address, skipped"
                );
                return None;
            }
            Some(DestinationInput {
                destination_id: d.destination_id.clone(),
                address: Some(d.address.trim().to_string()),
                is_active: true,
            })
        })
        .collect();

    if destinations.is_empty() {
        tracing::warn!(cluster_id = %entry.cluster_id, "Seed cluster has no destinations, skipped");
        return None;
    }

    let health_check = match &entry.health_check {
        Some(h) => HealthCheckSettings {
            enabled: h.enabled,
            path: Some(h.path.clone()),
            interval_secs: h.interval_secs,
            timeout_secs: h.timeout_secs,
        },
        None => HealthCheckSettings::default(),
    };

    Some(NewCluster {
        cluster_id: entry.cluster_id.clone(),
        load_balancing_policy: Some(entry.load_balancing_policy.clone()),
        health_check,
        is_active: true,
        destinations,
        actor: Some(SEED_ACTOR.to_string()),
    })
}

fn route_request(entry: &SeedRoute, cluster: Uuid) -> NewRoute {
    NewRoute {
        route_id: entry.route_id.clone(),
        path: entry.path.clone(),
        methods: entry.methods.clone(),
        rate_limiter_policy: entry.rate_limiter_policy.clone(),
        cluster,
        is_active: true,
        headers: entry.headers.clone(),
        transforms: entry.transforms.clone(),
        actor: Some(SEED_ACTOR.to_string()),
    }
}
