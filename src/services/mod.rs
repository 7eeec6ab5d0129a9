//! Entity mutation services.
//!
//! # Data Flow
//! ```text
//! admin handler
//!     → validate request            (ServiceError::Validation, nothing written)
//!     → SqlStore write              (commit or ServiceError)
//!     → ConfigProvider::update(OnDemand)
//!         Ok  → RefreshStatus::Applied { revision }
//!         Err → RefreshStatus::Failed { reason }, logged under
//!               phase = "on_demand_refresh"
//!     → Mutation { entity, refresh }
//! ```
//!
//! # Design Decisions
//! - A committed write is never reported as failed because the refresh
//!   after it failed; the scheduler reconciles on its next tick
//! - Refresh failures are logged apart from write errors

pub mod clusters;
pub mod routes;
pub mod validation;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::provider::{ConfigProvider, RefreshTrigger};
use crate::store::StoreError;

pub use clusters::ClusterService;
pub use routes::RouteService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} does not exist or is inactive")]
    InvalidReference { entity: &'static str, id: String },

    #[error("{entity} with id '{id}' already exists")]
    Conflict { entity: &'static str, id: String },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            StoreError::InvalidReference { entity, id } => {
                ServiceError::InvalidReference { entity, id }
            }
            StoreError::Conflict { entity, id } => ServiceError::Conflict { entity, id },
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome of the refresh that followed a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshStatus {
    Applied { revision: u64 },
    Failed { reason: String },
}

impl RefreshStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshStatus::Applied { .. })
    }

    /// Value for the `x-config-refresh` response header.
    pub fn header_value(&self) -> &'static str {
        match self {
            RefreshStatus::Applied { .. } => "applied",
            RefreshStatus::Failed { .. } => "failed",
        }
    }
}

/// A committed write plus the refresh status that followed it.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation<T> {
    pub entity: T,
    pub refresh: RefreshStatus,
}

/// Used when a service is built without an explicit refresh budget.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// On-demand trigger shared by every mutating call.
///
/// Bounded by `budget`, which covers waiting for the update lock as well as
/// the rebuild. On expiry the write stands and the scheduler catches up.
pub(crate) async fn refresh_after_write(
    provider: &ConfigProvider,
    budget: Duration,
    entity: &'static str,
    id: &str,
) -> RefreshStatus {
    let update = provider.update(RefreshTrigger::OnDemand);
    let outcome = match tokio::time::timeout(budget, update).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(
                phase = "on_demand_refresh",
                entity,
                id = %id,
                budget_ms = budget.as_millis() as u64,
                "Write committed but routing config refresh timed out"
            );
            return RefreshStatus::Failed {
                reason: "refresh timed out".to_string(),
            };
        }
    };

    match outcome {
        Ok(snapshot) => RefreshStatus::Applied {
            revision: snapshot.revision,
        },
        Err(e) => {
            tracing::error!(
                phase = "on_demand_refresh",
                entity,
                id = %id,
                error = %e,
                "Write committed but routing config refresh failed"
            );
            RefreshStatus::Failed {
                reason: e.to_string(),
            }
        }
    }
}
