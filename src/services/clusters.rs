//! Cluster writes with on-demand refresh.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::provider::ConfigProvider;
use crate::store::{ClusterChanges, ClusterRecord, NewCluster, Page, PageRequest, SqlStore};

use super::validation::{validate_cluster_changes, validate_new_cluster};
use super::{
    refresh_after_write, Mutation, ServiceError, ServiceResult, DEFAULT_REFRESH_TIMEOUT,
};

#[derive(Debug, Clone)]
pub struct ClusterService {
    store: SqlStore,
    provider: Arc<ConfigProvider>,
    refresh_timeout: Duration,
}

impl ClusterService {
    pub fn new(store: SqlStore, provider: Arc<ConfigProvider>) -> Self {
        Self {
            store,
            provider,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Bound the refresh that follows each write.
    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<ClusterRecord> {
        self.store
            .get_cluster(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "cluster",
                id: id.to_string(),
            })
    }

    pub async fn list(&self, page: PageRequest) -> ServiceResult<Page<ClusterRecord>> {
        Ok(self.store.list_clusters(page).await?)
    }

    pub async fn create(&self, request: NewCluster) -> ServiceResult<Mutation<ClusterRecord>> {
        validate_new_cluster(&request)?;

        let cluster = self.store.create_cluster(request).await?;
        tracing::info!(
            cluster_id = %cluster.cluster_id,
            id = %cluster.id,
            destinations = cluster.destinations.len(),
            "Cluster created"
        );

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "cluster", &cluster.cluster_id).await;
        Ok(Mutation {
            entity: cluster,
            refresh,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: ClusterChanges,
    ) -> ServiceResult<Mutation<ClusterRecord>> {
        validate_cluster_changes(&changes)?;

        let cluster = self.store.update_cluster(id, changes).await?;
        tracing::info!(cluster_id = %cluster.cluster_id, id = %id, "Cluster updated");

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "cluster", &cluster.cluster_id).await;
        Ok(Mutation {
            entity: cluster,
            refresh,
        })
    }

    /// Soft delete. Routes on the cluster drop out of the next snapshot.
    pub async fn delete(&self, id: Uuid, actor: Option<&str>) -> ServiceResult<Mutation<()>> {
        self.store.deactivate_cluster(id, actor).await?;
        tracing::info!(id = %id, "Cluster deactivated");

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "cluster", &id.to_string()).await;
        Ok(Mutation {
            entity: (),
            refresh,
        })
    }
}
