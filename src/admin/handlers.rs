use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::provider::{RefreshFailure, RefreshTrigger};
use crate::services::Mutation;
use crate::store::{
    ClusterChanges, DestinationInput, HeaderInput, HealthCheckSettings, NewCluster, NewRoute,
    PageRequest, RouteChanges,
};

pub const CONFIG_REFRESH_HEADER: HeaderName = HeaderName::from_static("x-config-refresh");
pub const ACTOR_HEADER: &str = "x-actor";

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub revision: u64,
    pub last_refresh: DateTime<Utc>,
    pub clusters: usize,
    pub routes: usize,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<RefreshFailure>,
}

#[derive(Serialize)]
pub struct RefreshSummary {
    pub revision: u64,
    pub built_at: DateTime<Utc>,
    pub clusters: usize,
    pub routes: usize,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub cluster_id: String,
    #[serde(default)]
    pub load_balancing_policy: Option<String>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSettings>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub destinations: Vec<DestinationInput>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub route_id: String,
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub rate_limiter_policy: Option<String>,
    /// Surrogate id of the target cluster.
    pub cluster: Uuid,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub headers: Vec<HeaderInput>,
    #[serde(default)]
    pub transforms: Vec<String>,
}

fn default_true() -> bool {
    true
}

// --- Config ---

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.provider.get_config();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        revision: snapshot.revision,
        last_refresh: snapshot.built_at,
        clusters: snapshot.clusters().len(),
        routes: snapshot.routes().len(),
        uptime_secs: uptime(state.started_at),
        last_failure: state.provider.last_failure(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Response {
    let snapshot = state.provider.get_config();
    Json(snapshot.as_ref()).into_response()
}

pub async fn force_refresh(State(state): State<AdminState>) -> Result<Json<RefreshSummary>, ApiError> {
    let snapshot = state.provider.update(RefreshTrigger::Manual).await?;
    Ok(Json(RefreshSummary {
        revision: snapshot.revision,
        built_at: snapshot.built_at,
        clusters: snapshot.clusters().len(),
        routes: snapshot.routes().len(),
    }))
}

// --- Clusters ---

pub async fn list_clusters(
    State(state): State<AdminState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = state.clusters.list(page_request(&state, &query)).await?;
    Ok(Json(page).into_response())
}

pub async fn get_cluster(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let cluster = state.clusters.get(parse_id(&id)?).await?;
    Ok(Json(cluster).into_response())
}

pub async fn create_cluster(
    State(state): State<AdminState>,
    headers: HeaderMap,
    payload: Result<Json<CreateClusterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    let request = NewCluster {
        cluster_id: body.cluster_id,
        load_balancing_policy: body.load_balancing_policy,
        health_check: body.health_check.unwrap_or_default(),
        is_active: body.is_active,
        destinations: body.destinations,
        actor: actor(&headers),
    };

    let mutation = state.clusters.create(request).await?;
    Ok(mutation_response(StatusCode::CREATED, mutation))
}

pub async fn update_cluster(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ClusterChanges>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let Json(mut changes) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    changes.actor = actor(&headers);

    let mutation = state.clusters.update(id, changes).await?;
    Ok(mutation_response(StatusCode::OK, mutation))
}

pub async fn delete_cluster(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let mutation = state.clusters.delete(id, actor(&headers).as_deref()).await?;
    Ok(empty_mutation_response(mutation))
}

// --- Routes ---

pub async fn list_routes(
    State(state): State<AdminState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = state.routes.list(page_request(&state, &query)).await?;
    Ok(Json(page).into_response())
}

pub async fn get_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let route = state.routes.get(parse_id(&id)?).await?;
    Ok(Json(route).into_response())
}

pub async fn create_route(
    State(state): State<AdminState>,
    headers: HeaderMap,
    payload: Result<Json<CreateRouteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    let request = NewRoute {
        route_id: body.route_id,
        path: body.path,
        methods: body.methods,
        rate_limiter_policy: body.rate_limiter_policy,
        cluster: body.cluster,
        is_active: body.is_active,
        headers: body.headers,
        transforms: body.transforms,
        actor: actor(&headers),
    };

    let mutation = state.routes.create(request).await?;
    Ok(mutation_response(StatusCode::CREATED, mutation))
}

pub async fn update_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RouteChanges>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let Json(mut changes) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    changes.actor = actor(&headers);

    let mutation = state.routes.update(id, changes).await?;
    Ok(mutation_response(StatusCode::OK, mutation))
}

pub async fn delete_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let mutation = state.routes.delete(id, actor(&headers).as_deref()).await?;
    Ok(empty_mutation_response(mutation))
}

// --- Helpers ---

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation(format!("'{raw}' is not a valid id")))
}

fn page_request(state: &AdminState, query: &PageQuery) -> PageRequest {
    let defaults = PageRequest::default();
    let size = query
        .page_size
        .unwrap_or(defaults.page_size)
        .min(state.max_page_size);
    PageRequest::new(query.page_number.unwrap_or(defaults.page_number), size)
}

fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn refresh_header<T>(mutation: &Mutation<T>) -> [(HeaderName, HeaderValue); 1] {
    [(
        CONFIG_REFRESH_HEADER,
        HeaderValue::from_static(mutation.refresh.header_value()),
    )]
}

fn mutation_response<T: Serialize>(status: StatusCode, mutation: Mutation<T>) -> Response {
    let headers = refresh_header(&mutation);
    (status, headers, Json(mutation.entity)).into_response()
}

fn empty_mutation_response(mutation: Mutation<()>) -> Response {
    (StatusCode::NO_CONTENT, refresh_header(&mutation)).into_response()
}

fn uptime(started_at: Instant) -> u64 {
    started_at.elapsed().as_secs()
}
