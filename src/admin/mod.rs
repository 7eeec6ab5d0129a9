//! Admin HTTP API.
//!
//! # Data Flow
//! ```text
//! operator / CLI
//!     → axum Router (/admin/*)
//!         request id → trace span → timeout
//!     → handlers.rs
//!         clusters, routes  → services (write + on-demand refresh)
//!         config/refresh    → ConfigProvider::update(Manual)
//!         config, status    → ConfigProvider::get_config()
//!     → JSON body, or error.rs {code, message, status}
//! ```
//!
//! # Design Decisions
//! - Writes report their refresh outcome in `x-config-refresh`, never as
//!   an error status
//! - Entities are addressed by surrogate id; external ids live in bodies

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::provider::ConfigProvider;
use crate::services::{ClusterService, RouteService};
use crate::store::SqlStore;

use self::handlers::*;

pub use self::error::{ApiError, ApiErrorCode, ErrorResponse};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AdminState {
    pub provider: Arc<ConfigProvider>,
    pub clusters: ClusterService,
    pub routes: RouteService,
    pub max_page_size: u32,
    pub started_at: Instant,
}

impl AdminState {
    /// `refresh_timeout` bounds the refresh after each write and must be
    /// shorter than the router's request timeout.
    pub fn new(
        store: SqlStore,
        provider: Arc<ConfigProvider>,
        max_page_size: u32,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            clusters: ClusterService::new(store.clone(), provider.clone())
                .with_refresh_timeout(refresh_timeout),
            routes: RouteService::new(store, provider.clone())
                .with_refresh_timeout(refresh_timeout),
            provider,
            max_page_size,
            started_at: Instant::now(),
        }
    }
}

/// Build the admin router with all middleware layers.
#[allow(deprecated)]
pub fn admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config))
        .route("/admin/config/refresh", post(force_refresh))
        .route("/admin/clusters", get(list_clusters).post(create_cluster))
        .route(
            "/admin/clusters/{id}",
            get(get_cluster).put(update_cluster).delete(delete_cluster),
        )
        .route("/admin/routes", get(list_routes).post(create_route))
        .route(
            "/admin/routes/{id}",
            get(get_route).put(update_route).delete(delete_route),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
