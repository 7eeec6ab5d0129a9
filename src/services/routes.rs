//! Route writes with on-demand refresh.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::provider::ConfigProvider;
use crate::store::{NewRoute, Page, PageRequest, RouteChanges, RouteRecord, SqlStore};

use super::validation::{validate_new_route, validate_route_changes};
use super::{
    refresh_after_write, Mutation, ServiceError, ServiceResult, DEFAULT_REFRESH_TIMEOUT,
};

#[derive(Debug, Clone)]
pub struct RouteService {
    store: SqlStore,
    provider: Arc<ConfigProvider>,
    refresh_timeout: Duration,
}

impl RouteService {
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

    pub async fn get(&self, id: Uuid) -> ServiceResult<RouteRecord> {
        self.store
            .get_route(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "route",
                id: id.to_string(),
            })
    }

    pub async fn list(&self, page: PageRequest) -> ServiceResult<Page<RouteRecord>> {
        Ok(self.store.list_routes(page).await?)
    }

    pub async fn create(&self, request: NewRoute) -> ServiceResult<Mutation<RouteRecord>> {
        validate_new_route(&request)?;

        let route = self.store.create_route(request).await?;
        tracing::info!(
            route_id = %route.route_id,
            id = %route.id,
            path = %route.path,
            "Route created"
        );

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "route", &route.route_id).await;
        Ok(Mutation {
            entity: route,
            refresh,
        })
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: RouteChanges,
    ) -> ServiceResult<Mutation<RouteRecord>> {
        validate_route_changes(&changes)?;

        let route = self.store.update_route(id, changes).await?;
        tracing::info!(route_id = %route.route_id, id = %id, "Route updated");

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "route", &route.route_id).await;
        Ok(Mutation {
            entity: route,
            refresh,
        })
    }

    pub async fn delete(&self, id: Uuid, actor: Option<&str>) -> ServiceResult<Mutation<()>> {
        self.store.deactivate_route(id, actor).await?;
        tracing::info!(id = %id, "Route deactivated");

        let refresh =
            refresh_after_write(&self.provider, self.refresh_timeout, "route", &id.to_string()).await;
        Ok(Mutation {
            entity: (),
            refresh,
        })
    }
}
