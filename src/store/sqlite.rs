//! SQLite-backed entity store.
//!
//! # Responsibilities
//! - Own the connection pool and schema
//! - Serve the two snapshot read passes
//! - CRUD for clusters and routes, including child collections
//!
//! # Design Decisions
//! - Surrogate keys are UUIDs; external ids carry UNIQUE constraints
//! - List-valued columns (methods, header values) are JSON text
//! - Multi-row writes run in one transaction so a half-written cluster
//!   is never visible to a concurrent snapshot read

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::store::entities::DEFAULT_HEADER_MODE;
use crate::store::{
    Audit, ClusterChanges, ClusterRecord, ClusterRef, DestinationInput, DestinationRecord,
    EntityStore, HeaderInput, HeaderRecord, HealthCheckSettings, NewCluster, NewRoute, Page,
    PageRequest, RouteChanges, RouteRecord, StoreError, StoreResult, TransformRecord,
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS clusters (
        id BLOB PRIMARY KEY NOT NULL,
        cluster_id TEXT NOT NULL UNIQUE,
        load_balancing_policy TEXT,
        health_check_enabled INTEGER NOT NULL DEFAULT 0,
        health_check_path TEXT,
        health_check_interval_secs INTEGER NOT NULL DEFAULT 30,
        health_check_timeout_secs INTEGER NOT NULL DEFAULT 10,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        created_by TEXT,
        updated_by TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS destinations (
        id BLOB PRIMARY KEY NOT NULL,
        cluster_ref BLOB NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
        destination_id TEXT NOT NULL UNIQUE,
        address TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        created_by TEXT,
        updated_by TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS routes (
        id BLOB PRIMARY KEY NOT NULL,
        route_id TEXT NOT NULL UNIQUE,
        path TEXT NOT NULL,
        methods TEXT NOT NULL DEFAULT '[]',
        rate_limiter_policy TEXT,
        cluster_ref BLOB NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        created_by TEXT,
        updated_by TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS route_headers (
        id BLOB PRIMARY KEY NOT NULL,
        route_ref BLOB NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        match_values TEXT NOT NULL DEFAULT '[]',
        mode TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        UNIQUE (route_ref, name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS route_transforms (
        id BLOB PRIMARY KEY NOT NULL,
        route_ref BLOB NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
        path_pattern TEXT NOT NULL,
        sort_order INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        UNIQUE (route_ref, path_pattern)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_destinations_cluster ON destinations(cluster_ref)",
    "CREATE INDEX IF NOT EXISTS idx_routes_cluster ON routes(cluster_ref)",
];

const CLUSTER_SELECT: &str = "SELECT id, cluster_id, load_balancing_policy, health_check_enabled, \
     health_check_path, health_check_interval_secs, health_check_timeout_secs, is_active, \
     created_at, updated_at, created_by, updated_by FROM clusters";

const ROUTE_SELECT: &str = "SELECT r.id, r.route_id, r.path, r.methods, r.rate_limiter_policy, \
     c.id AS cluster_pk, c.cluster_id AS cluster_external_id, c.is_active AS cluster_is_active, \
     r.is_active, r.created_at, r.updated_at, r.created_by, r.updated_by \
     FROM routes r LEFT JOIN clusters c ON c.id = r.cluster_ref";

#[derive(Debug, FromRow)]
struct ClusterRow {
    id: Uuid,
    cluster_id: String,
    load_balancing_policy: Option<String>,
    health_check_enabled: bool,
    health_check_path: Option<String>,
    health_check_interval_secs: i64,
    health_check_timeout_secs: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

#[derive(Debug, FromRow)]
struct DestinationRow {
    id: Uuid,
    cluster_ref: Uuid,
    destination_id: String,
    address: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

#[derive(Debug, FromRow)]
struct RouteRow {
    id: Uuid,
    route_id: String,
    path: String,
    methods: Json<Vec<String>>,
    rate_limiter_policy: Option<String>,
    cluster_pk: Option<Uuid>,
    cluster_external_id: Option<String>,
    cluster_is_active: Option<bool>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

#[derive(Debug, FromRow)]
struct HeaderRow {
    id: Uuid,
    route_ref: Uuid,
    name: String,
    match_values: Json<Vec<String>>,
    mode: String,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct TransformRow {
    id: Uuid,
    route_ref: Uuid,
    path_pattern: String,
    sort_order: i64,
    is_active: bool,
}

impl ClusterRow {
    fn into_record(self, destinations: Vec<DestinationRecord>) -> ClusterRecord {
        ClusterRecord {
            id: self.id,
            cluster_id: self.cluster_id,
            load_balancing_policy: self.load_balancing_policy,
            health_check: HealthCheckSettings {
                enabled: self.health_check_enabled,
                path: self.health_check_path,
                interval_secs: self.health_check_interval_secs,
                timeout_secs: self.health_check_timeout_secs,
            },
            is_active: self.is_active,
            audit: Audit {
                created_at: self.created_at,
                updated_at: self.updated_at,
                created_by: self.created_by,
                updated_by: self.updated_by,
            },
            destinations,
        }
    }
}

impl From<DestinationRow> for DestinationRecord {
    fn from(row: DestinationRow) -> Self {
        Self {
            id: row.id,
            destination_id: row.destination_id,
            address: row.address,
            is_active: row.is_active,
            audit: Audit {
                created_at: row.created_at,
                updated_at: row.updated_at,
                created_by: row.created_by,
                updated_by: row.updated_by,
            },
        }
    }
}

impl RouteRow {
    fn into_record(
        self,
        headers: Vec<HeaderRecord>,
        transforms: Vec<TransformRecord>,
    ) -> RouteRecord {
        let cluster = match (self.cluster_pk, self.cluster_external_id) {
            (Some(id), Some(cluster_id)) => Some(ClusterRef {
                id,
                cluster_id,
                is_active: self.cluster_is_active.unwrap_or(false),
            }),
            _ => None,
        };

        RouteRecord {
            id: self.id,
            route_id: self.route_id,
            path: self.path,
            methods: self.methods.0,
            rate_limiter_policy: self.rate_limiter_policy,
            cluster,
            is_active: self.is_active,
            audit: Audit {
                created_at: self.created_at,
                updated_at: self.updated_at,
                created_by: self.created_by,
                updated_by: self.updated_by,
            },
            headers,
            transforms,
        }
    }
}

impl From<HeaderRow> for HeaderRecord {
    fn from(row: HeaderRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            values: row.match_values.0,
            mode: row.mode,
            is_active: row.is_active,
        }
    }
}

impl From<TransformRow> for TransformRecord {
    fn from(row: TransformRow) -> Self {
        Self {
            id: row.id,
            path_pattern: row.path_pattern,
            sort_order: row.sort_order,
            is_active: row.is_active,
        }
    }
}

/// Entity store over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Open (creating if needed) the configured database and migrate it.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.query_timeout_secs))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Entity store opened"
        );
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    ///
    /// A single pooled connection that never idles out keeps the database
    /// alive for the lifetime of the store.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool (already migrated or not).
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }
        Ok(())
    }

    /// True when at least one cluster or route row exists.
    pub async fn has_any_config(&self) -> StoreResult<bool> {
        let clusters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clusters")
            .fetch_one(&self.pool)
            .await?;
        let routes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM routes")
            .fetch_one(&self.pool)
            .await?;
        Ok(clusters > 0 || routes > 0)
    }

    // --- Clusters ---

    pub async fn get_cluster(&self, id: Uuid) -> StoreResult<Option<ClusterRecord>> {
        let sql = format!("{CLUSTER_SELECT} WHERE id = ?1");
        let row: Option<ClusterRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let destinations = self.destinations_of(Some(row.id)).await?;
                let destinations = destinations.into_values().flatten().collect();
                Ok(Some(row.into_record(destinations)))
            }
            None => Ok(None),
        }
    }

    pub async fn find_cluster(&self, cluster_id: &str) -> StoreResult<Option<ClusterRecord>> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM clusters WHERE cluster_id = ?1")
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;
        match id {
            Some(id) => self.get_cluster(id).await,
            None => Ok(None),
        }
    }

    pub async fn list_clusters(&self, page: PageRequest) -> StoreResult<Page<ClusterRecord>> {
        let total_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clusters")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("{CLUSTER_SELECT} ORDER BY cluster_id LIMIT ?1 OFFSET ?2");
        let rows: Vec<ClusterRow> = sqlx::query_as(&sql)
            .bind(page.page_size as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let destinations = self.destinations_of(Some(row.id)).await?;
            items.push(row.into_record(destinations.into_values().flatten().collect()));
        }

        Ok(Page {
            items,
            total_count,
            page_number: page.page_number,
            page_size: page.page_size,
        })
    }

    pub async fn create_cluster(&self, new: NewCluster) -> StoreResult<ClusterRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO clusters (id, cluster_id, load_balancing_policy, health_check_enabled, \
             health_check_path, health_check_interval_secs, health_check_timeout_secs, is_active, \
             created_at, updated_at, created_by, updated_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?10)",
        )
        .bind(id)
        .bind(&new.cluster_id)
        .bind(&new.load_balancing_policy)
        .bind(new.health_check.enabled)
        .bind(&new.health_check.path)
        .bind(new.health_check.interval_secs)
        .bind(new.health_check.timeout_secs)
        .bind(new.is_active)
        .bind(now)
        .bind(&new.actor)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "cluster", &new.cluster_id))?;

        for destination in &new.destinations {
            insert_destination(&mut tx, id, destination, now, new.actor.as_deref()).await?;
        }

        tx.commit().await?;
        tracing::debug!(cluster_id = %new.cluster_id, id = %id, "Cluster row inserted");

        self.get_cluster(id).await?.ok_or(StoreError::NotFound {
            entity: "cluster",
            id: id.to_string(),
        })
    }

    pub async fn update_cluster(
        &self,
        id: Uuid,
        changes: ClusterChanges,
    ) -> StoreResult<ClusterRecord> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM clusters WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                entity: "cluster",
                id: id.to_string(),
            });
        }

        let label = changes.cluster_id.clone().unwrap_or_else(|| id.to_string());
        sqlx::query(
            "UPDATE clusters SET \
             cluster_id = COALESCE(?1, cluster_id), \
             load_balancing_policy = COALESCE(?2, load_balancing_policy), \
             health_check_enabled = COALESCE(?3, health_check_enabled), \
             health_check_path = COALESCE(?4, health_check_path), \
             health_check_interval_secs = COALESCE(?5, health_check_interval_secs), \
             health_check_timeout_secs = COALESCE(?6, health_check_timeout_secs), \
             is_active = COALESCE(?7, is_active), \
             updated_at = ?8, \
             updated_by = COALESCE(?9, updated_by) \
             WHERE id = ?10",
        )
        .bind(&changes.cluster_id)
        .bind(&changes.load_balancing_policy)
        .bind(changes.health_check_enabled)
        .bind(&changes.health_check_path)
        .bind(changes.health_check_interval_secs)
        .bind(changes.health_check_timeout_secs)
        .bind(changes.is_active)
        .bind(now)
        .bind(&changes.actor)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "cluster", &label))?;

        for destination_id in &changes.remove_destinations {
            sqlx::query("DELETE FROM destinations WHERE cluster_ref = ?1 AND destination_id = ?2")
                .bind(id)
                .bind(destination_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(desired) = &changes.destinations {
            let existing: Vec<String> =
                sqlx::query_scalar("SELECT destination_id FROM destinations WHERE cluster_ref = ?1")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let existing: HashSet<String> = existing.into_iter().collect();

            for destination in desired {
                if existing.contains(&destination.destination_id) {
                    sqlx::query(
                        "UPDATE destinations SET address = COALESCE(?1, address), is_active = ?2, \
                         updated_at = ?3, updated_by = COALESCE(?4, updated_by) \
                         WHERE cluster_ref = ?5 AND destination_id = ?6",
                    )
                    .bind(&destination.address)
                    .bind(destination.is_active)
                    .bind(now)
                    .bind(&changes.actor)
                    .bind(id)
                    .bind(&destination.destination_id)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    insert_destination(&mut tx, id, destination, now, changes.actor.as_deref())
                        .await?;
                }
            }

            let keep: HashSet<&str> = desired.iter().map(|d| d.destination_id.as_str()).collect();
            for stale in existing.iter().filter(|d| !keep.contains(d.as_str())) {
                sqlx::query("DELETE FROM destinations WHERE cluster_ref = ?1 AND destination_id = ?2")
                    .bind(id)
                    .bind(stale)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        self.get_cluster(id).await?.ok_or(StoreError::NotFound {
            entity: "cluster",
            id: id.to_string(),
        })
    }

    /// Soft delete: the row stays, `is_active` goes false.
    pub async fn deactivate_cluster(&self, id: Uuid, actor: Option<&str>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE clusters SET is_active = 0, updated_at = ?1, \
             updated_by = COALESCE(?2, updated_by) WHERE id = ?3",
        )
        .bind(Utc::now())
        .bind(actor)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "cluster",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // --- Routes ---

    pub async fn get_route(&self, id: Uuid) -> StoreResult<Option<RouteRecord>> {
        let sql = format!("{ROUTE_SELECT} WHERE r.id = ?1");
        let row: Option<RouteRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut headers = self.headers_of(Some(row.id)).await?;
                let mut transforms = self.transforms_of(Some(row.id)).await?;
                let route_pk = row.id;
                Ok(Some(row.into_record(
                    headers.remove(&route_pk).unwrap_or_default(),
                    transforms.remove(&route_pk).unwrap_or_default(),
                )))
            }
            None => Ok(None),
        }
    }

    pub async fn find_route(&self, route_id: &str) -> StoreResult<Option<RouteRecord>> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM routes WHERE route_id = ?1")
            .bind(route_id)
            .fetch_optional(&self.pool)
            .await?;
        match id {
            Some(id) => self.get_route(id).await,
            None => Ok(None),
        }
    }

    pub async fn list_routes(&self, page: PageRequest) -> StoreResult<Page<RouteRecord>> {
        let total_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM routes")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("{ROUTE_SELECT} ORDER BY r.route_id LIMIT ?1 OFFSET ?2");
        let rows: Vec<RouteRow> = sqlx::query_as(&sql)
            .bind(page.page_size as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let route_pk = row.id;
            let mut headers = self.headers_of(Some(route_pk)).await?;
            let mut transforms = self.transforms_of(Some(route_pk)).await?;
            items.push(row.into_record(
                headers.remove(&route_pk).unwrap_or_default(),
                transforms.remove(&route_pk).unwrap_or_default(),
            ));
        }

        Ok(Page {
            items,
            total_count,
            page_number: page.page_number,
            page_size: page.page_size,
        })
    }

    pub async fn create_route(&self, new: NewRoute) -> StoreResult<RouteRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ensure_active_cluster(&mut tx, new.cluster).await?;

        sqlx::query(
            "INSERT INTO routes (id, route_id, path, methods, rate_limiter_policy, cluster_ref, \
             is_active, created_at, updated_at, created_by, updated_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?9)",
        )
        .bind(id)
        .bind(&new.route_id)
        .bind(&new.path)
        .bind(Json(&new.methods))
        .bind(&new.rate_limiter_policy)
        .bind(new.cluster)
        .bind(new.is_active)
        .bind(now)
        .bind(&new.actor)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "route", &new.route_id))?;

        for header in &new.headers {
            insert_header(&mut tx, id, header, now).await?;
        }
        for (position, pattern) in new.transforms.iter().enumerate() {
            insert_transform(&mut tx, id, pattern, position as i64, now).await?;
        }

        tx.commit().await?;
        tracing::debug!(route_id = %new.route_id, id = %id, "Route row inserted");

        self.get_route(id).await?.ok_or(StoreError::NotFound {
            entity: "route",
            id: id.to_string(),
        })
    }

    pub async fn update_route(&self, id: Uuid, changes: RouteChanges) -> StoreResult<RouteRecord> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM routes WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                entity: "route",
                id: id.to_string(),
            });
        }

        if let Some(cluster) = changes.cluster {
            ensure_active_cluster(&mut tx, cluster).await?;
        }

        let label = changes.route_id.clone().unwrap_or_else(|| id.to_string());
        sqlx::query(
            "UPDATE routes SET \
             route_id = COALESCE(?1, route_id), \
             path = COALESCE(?2, path), \
             methods = COALESCE(?3, methods), \
             rate_limiter_policy = COALESCE(?4, rate_limiter_policy), \
             cluster_ref = COALESCE(?5, cluster_ref), \
             is_active = COALESCE(?6, is_active), \
             updated_at = ?7, \
             updated_by = COALESCE(?8, updated_by) \
             WHERE id = ?9",
        )
        .bind(&changes.route_id)
        .bind(&changes.path)
        .bind(changes.methods.as_ref().map(Json))
        .bind(&changes.rate_limiter_policy)
        .bind(changes.cluster)
        .bind(changes.is_active)
        .bind(now)
        .bind(&changes.actor)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "route", &label))?;

        for name in &changes.remove_headers {
            sqlx::query("DELETE FROM route_headers WHERE route_ref = ?1 AND name = ?2")
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        for pattern in &changes.remove_transforms {
            sqlx::query("DELETE FROM route_transforms WHERE route_ref = ?1 AND path_pattern = ?2")
                .bind(id)
                .bind(pattern)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(desired) = &changes.headers {
            let existing: Vec<String> =
                sqlx::query_scalar("SELECT name FROM route_headers WHERE route_ref = ?1")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let existing: HashSet<String> = existing.into_iter().collect();

            for header in desired {
                if existing.contains(&header.name) {
                    sqlx::query(
                        "UPDATE route_headers SET match_values = ?1, mode = COALESCE(?2, mode), \
                         is_active = 1, updated_at = ?3 WHERE route_ref = ?4 AND name = ?5",
                    )
                    .bind(Json(&header.values))
                    .bind(&header.mode)
                    .bind(now)
                    .bind(id)
                    .bind(&header.name)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    insert_header(&mut tx, id, header, now).await?;
                }
            }

            let keep: HashSet<&str> = desired.iter().map(|h| h.name.as_str()).collect();
            for stale in existing.iter().filter(|n| !keep.contains(n.as_str())) {
                sqlx::query("DELETE FROM route_headers WHERE route_ref = ?1 AND name = ?2")
                    .bind(id)
                    .bind(stale)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let Some(desired) = &changes.transforms {
            let existing: Vec<String> =
                sqlx::query_scalar("SELECT path_pattern FROM route_transforms WHERE route_ref = ?1")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let existing: HashSet<String> = existing.into_iter().collect();

            for (position, pattern) in desired.iter().enumerate() {
                if existing.contains(pattern) {
                    sqlx::query(
                        "UPDATE route_transforms SET sort_order = ?1, is_active = 1, updated_at = ?2 \
                         WHERE route_ref = ?3 AND path_pattern = ?4",
                    )
                    .bind(position as i64)
                    .bind(now)
                    .bind(id)
                    .bind(pattern)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    insert_transform(&mut tx, id, pattern, position as i64, now).await?;
                }
            }

            let keep: HashSet<&str> = desired.iter().map(String::as_str).collect();
            for stale in existing.iter().filter(|p| !keep.contains(p.as_str())) {
                sqlx::query("DELETE FROM route_transforms WHERE route_ref = ?1 AND path_pattern = ?2")
                    .bind(id)
                    .bind(stale)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        self.get_route(id).await?.ok_or(StoreError::NotFound {
            entity: "route",
            id: id.to_string(),
        })
    }

    /// Soft delete: the row stays, `is_active` goes false.
    pub async fn deactivate_route(&self, id: Uuid, actor: Option<&str>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE routes SET is_active = 0, updated_at = ?1, \
             updated_by = COALESCE(?2, updated_by) WHERE id = ?3",
        )
        .bind(Utc::now())
        .bind(actor)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "route",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // --- Child collections, grouped by parent. `None` loads every parent. ---

    async fn destinations_of(
        &self,
        cluster: Option<Uuid>,
    ) -> StoreResult<HashMap<Uuid, Vec<DestinationRecord>>> {
        let rows: Vec<DestinationRow> = sqlx::query_as(
            "SELECT id, cluster_ref, destination_id, address, is_active, created_at, updated_at, \
             created_by, updated_by FROM destinations \
             WHERE (?1 IS NULL OR cluster_ref = ?1) ORDER BY destination_id",
        )
        .bind(cluster)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<DestinationRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.cluster_ref).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn headers_of(&self, route: Option<Uuid>) -> StoreResult<HashMap<Uuid, Vec<HeaderRecord>>> {
        let rows: Vec<HeaderRow> = sqlx::query_as(
            "SELECT id, route_ref, name, match_values, mode, is_active FROM route_headers \
             WHERE (?1 IS NULL OR route_ref = ?1) ORDER BY rowid",
        )
        .bind(route)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<HeaderRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.route_ref).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn transforms_of(
        &self,
        route: Option<Uuid>,
    ) -> StoreResult<HashMap<Uuid, Vec<TransformRecord>>> {
        let rows: Vec<TransformRow> = sqlx::query_as(
            "SELECT id, route_ref, path_pattern, sort_order, is_active FROM route_transforms \
             WHERE (?1 IS NULL OR route_ref = ?1) ORDER BY sort_order, rowid",
        )
        .bind(route)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<TransformRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.route_ref).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

#[async_trait]
impl EntityStore for SqlStore {
    async fn clusters_with_destinations(&self) -> StoreResult<Vec<ClusterRecord>> {
        let sql = format!("{CLUSTER_SELECT} ORDER BY cluster_id");
        let rows: Vec<ClusterRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut destinations = self.destinations_of(None).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let owned = destinations.remove(&row.id).unwrap_or_default();
                row.into_record(owned)
            })
            .collect())
    }

    async fn routes_with_relations(&self) -> StoreResult<Vec<RouteRecord>> {
        let sql = format!("{ROUTE_SELECT} ORDER BY r.route_id");
        let rows: Vec<RouteRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut headers = self.headers_of(None).await?;
        let mut transforms = self.transforms_of(None).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let route_pk = row.id;
                row.into_record(
                    headers.remove(&route_pk).unwrap_or_default(),
                    transforms.remove(&route_pk).unwrap_or_default(),
                )
            })
            .collect())
    }
}

async fn ensure_active_cluster(conn: &mut SqliteConnection, cluster: Uuid) -> StoreResult<()> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM clusters WHERE id = ?1")
        .bind(cluster)
        .fetch_optional(&mut *conn)
        .await?;

    match active {
        Some(true) => Ok(()),
        _ => Err(StoreError::InvalidReference {
            entity: "cluster",
            id: cluster.to_string(),
        }),
    }
}

async fn insert_destination(
    conn: &mut SqliteConnection,
    cluster: Uuid,
    destination: &DestinationInput,
    now: DateTime<Utc>,
    actor: Option<&str>,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO destinations (id, cluster_ref, destination_id, address, is_active, \
         created_at, updated_at, created_by, updated_by) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?7)",
    )
    .bind(Uuid::new_v4())
    .bind(cluster)
    .bind(&destination.destination_id)
    .bind(&destination.address)
    .bind(destination.is_active)
    .bind(now)
    .bind(actor)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_write(e, "destination", &destination.destination_id))?;
    Ok(())
}

async fn insert_header(
    conn: &mut SqliteConnection,
    route: Uuid,
    header: &HeaderInput,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO route_headers (id, route_ref, name, match_values, mode, is_active, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
    )
    .bind(Uuid::new_v4())
    .bind(route)
    .bind(&header.name)
    .bind(Json(&header.values))
    .bind(header.mode.as_deref().unwrap_or(DEFAULT_HEADER_MODE))
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_write(e, "header", &header.name))?;
    Ok(())
}

async fn insert_transform(
    conn: &mut SqliteConnection,
    route: Uuid,
    pattern: &str,
    position: i64,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO route_transforms (id, route_ref, path_pattern, sort_order, is_active, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
    )
    .bind(Uuid::new_v4())
    .bind(route)
    .bind(pattern)
    .bind(position)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_write(e, "transform", pattern))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(cluster_id: &str, destinations: &[(&str, &str)]) -> NewCluster {
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
            actor: Some("tester".to_string()),
        }
    }

    fn route(route_id: &str, cluster: Uuid) -> NewRoute {
        NewRoute {
            route_id: route_id.to_string(),
            path: "/api/{**catch-all}".to_string(),
            methods: vec!["GET".to_string(), "POST".to_string()],
            rate_limiter_policy: None,
            cluster,
            is_active: true,
            headers: vec![HeaderInput {
                name: "x-tenant".to_string(),
                values: vec!["blue".to_string()],
                mode: Some("HeaderPrefix".to_string()),
            }],
            transforms: vec!["/v1/{**catch-all}".to_string(), "/v2/{**catch-all}".to_string()],
            actor: None,
        }
    }

    #[tokio::test]
    async fn test_create_cluster_round_trips_destinations() {
        let store = SqlStore::in_memory().await.unwrap();
        let created = store
            .create_cluster(cluster("c1", &[("d1", "http://h1:80"), ("d2", "http://h2:80")]))
            .await
            .unwrap();

        assert_eq!(created.cluster_id, "c1");
        assert_eq!(created.destinations.len(), 2);
        assert_eq!(created.audit.created_by.as_deref(), Some("tester"));

        let by_external = store.find_cluster("c1").await.unwrap().unwrap();
        assert_eq!(by_external.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_cluster_id_is_conflict() {
        let store = SqlStore::in_memory().await.unwrap();
        store.create_cluster(cluster("c1", &[("d1", "http://h1")])).await.unwrap();

        let err = store
            .create_cluster(cluster("c1", &[("d9", "http://h9")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "cluster", .. }));
    }

    #[tokio::test]
    async fn test_update_cluster_replaces_destination_set() {
        let store = SqlStore::in_memory().await.unwrap();
        let created = store
            .create_cluster(cluster("c1", &[("d1", "http://h1"), ("d2", "http://h2")]))
            .await
            .unwrap();

        let updated = store
            .update_cluster(
                created.id,
                ClusterChanges {
                    load_balancing_policy: Some("LeastRequests".to_string()),
                    destinations: Some(vec![
                        DestinationInput {
                            destination_id: "d1".to_string(),
                            address: None,
                            is_active: false,
                        },
                        DestinationInput {
                            destination_id: "d3".to_string(),
                            address: Some("http://h3".to_string()),
                            is_active: true,
                        },
                    ]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.load_balancing_policy.as_deref(), Some("LeastRequests"));
        let ids: Vec<&str> = updated
            .destinations
            .iter()
            .map(|d| d.destination_id.as_str())
            .collect();
        assert_eq!(ids, vec!["d1", "d3"]);
        let d1 = &updated.destinations[0];
        assert!(!d1.is_active);
        assert_eq!(d1.address.as_deref(), Some("http://h1"));
    }

    #[tokio::test]
    async fn test_route_requires_active_cluster() {
        let store = SqlStore::in_memory().await.unwrap();
        let created = store.create_cluster(cluster("c1", &[("d1", "http://h1")])).await.unwrap();
        store.deactivate_cluster(created.id, None).await.unwrap();

        let err = store.create_route(route("r1", created.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));

        let err = store.create_route(route("r2", Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_route_relations_are_loaded_in_order() {
        let store = SqlStore::in_memory().await.unwrap();
        let c1 = store.create_cluster(cluster("c1", &[("d1", "http://h1")])).await.unwrap();
        store.create_route(route("r1", c1.id)).await.unwrap();

        let routes = store.routes_with_relations().await.unwrap();
        assert_eq!(routes.len(), 1);
        let r1 = &routes[0];
        assert_eq!(r1.methods, vec!["GET", "POST"]);
        assert_eq!(r1.cluster.as_ref().unwrap().cluster_id, "c1");
        assert_eq!(r1.headers[0].mode, "HeaderPrefix");
        let patterns: Vec<&str> = r1.transforms.iter().map(|t| t.path_pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/v1/{**catch-all}", "/v2/{**catch-all}"]);
    }

    #[tokio::test]
    async fn test_update_route_reorders_and_prunes_transforms() {
        let store = SqlStore::in_memory().await.unwrap();
        let c1 = store.create_cluster(cluster("c1", &[("d1", "http://h1")])).await.unwrap();
        let r1 = store.create_route(route("r1", c1.id)).await.unwrap();

        let updated = store
            .update_route(
                r1.id,
                RouteChanges {
                    transforms: Some(vec!["/v3/{**catch-all}".into(), "/v1/{**catch-all}".into()]),
                    remove_headers: vec!["x-tenant".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let patterns: Vec<&str> = updated
            .transforms
            .iter()
            .map(|t| t.path_pattern.as_str())
            .collect();
        assert_eq!(patterns, vec!["/v3/{**catch-all}", "/v1/{**catch-all}"]);
        assert!(updated.headers.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_reports_total() {
        let store = SqlStore::in_memory().await.unwrap();
        for i in 0..5 {
            store
                .create_cluster(cluster(&format!("c{i}"), &[(&format!("d{i}"), "http://h")]))
                .await
                .unwrap();
        }

        let page = store.list_clusters(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].cluster_id, "c2");
        assert_eq!(page.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let store = SqlStore::in_memory().await.unwrap();
        let c1 = store.create_cluster(cluster("c1", &[("d1", "http://h1")])).await.unwrap();
        store.deactivate_cluster(c1.id, Some("ops")).await.unwrap();

        let reloaded = store.get_cluster(c1.id).await.unwrap().unwrap();
        assert!(!reloaded.is_active);
        assert_eq!(reloaded.audit.updated_by.as_deref(), Some("ops"));

        let missing = store.deactivate_cluster(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }
}
