//! Entity store subsystem.
//!
//! # Data Flow
//! ```text
//! admin API / services
//!     → sqlite.rs (CRUD writes, soft delete, pagination)
//!     → SQLite tables: clusters, destinations, routes,
//!       route_headers, route_transforms
//!
//! snapshot builder
//!     → EntityStore (two read passes)
//!         clusters_with_destinations()
//!         routes_with_relations()
//! ```
//!
//! # Design Decisions
//! - The read side is a trait so the provider can be built over any store
//! - Reads return inactive rows too; active-only filtering happens at
//!   snapshot time where cascade rules live
//! - Rows are never hard-deleted by a delete call, only deactivated

pub mod entities;
pub mod seed;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use entities::{
    Audit, ClusterChanges, ClusterRecord, ClusterRef, DestinationInput, DestinationRecord,
    HeaderInput, HeaderRecord, HealthCheckSettings, NewCluster, NewRoute, Page, PageRequest,
    RouteChanges, RouteRecord, TransformRecord,
};
pub use sqlite::SqlStore;

/// Errors raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity, I/O or SQL failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The addressed row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A foreign key points at a missing or inactive row.
    #[error("{entity} {id} does not exist or is inactive")]
    InvalidReference { entity: &'static str, id: String },

    /// A unique external id is already taken.
    #[error("{entity} with id '{id}' already exists")]
    Conflict { entity: &'static str, id: String },

    /// Injected or backend-specific outage.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Translate a unique-constraint violation into `Conflict`, pass
    /// everything else through.
    pub(crate) fn from_write(err: sqlx::Error, entity: &'static str, id: &str) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict {
                    entity,
                    id: id.to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read boundary consumed by the snapshot builder.
///
/// The two calls are not wrapped in one transaction; a cluster may change
/// between them and callers must tolerate a route whose cluster is missing
/// from the first result.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All clusters ordered by external id, each with every destination.
    async fn clusters_with_destinations(&self) -> StoreResult<Vec<ClusterRecord>>;

    /// All routes ordered by external id, with cluster reference, headers
    /// and ordered transforms.
    async fn routes_with_relations(&self) -> StoreResult<Vec<RouteRecord>>;
}
