//! Persisted routing entities.
//!
//! Records are what the store hands back: a cluster carries all of its
//! destinations, a route carries its cluster reference, headers and
//! transforms. Inactive children are included; filtering them out is the
//! snapshot builder's job, not the store's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit columns shared by every table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// Active health-check settings of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSettings {
    pub enabled: bool,
    pub path: Option<String>,
    /// Probe interval in seconds.
    pub interval_secs: i64,
    /// Probe timeout in seconds.
    pub timeout_secs: i64,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            interval_secs: 30,
            timeout_secs: 10,
        }
    }
}

/// A backend service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Surrogate key.
    pub id: Uuid,
    /// External id the proxy engine keys its tables by.
    pub cluster_id: String,
    pub load_balancing_policy: Option<String>,
    pub health_check: HealthCheckSettings,
    pub is_active: bool,
    pub audit: Audit,
    pub destinations: Vec<DestinationRecord>,
}

impl ClusterRecord {
    /// Destinations that are switched on.
    pub fn active_destinations(&self) -> impl Iterator<Item = &DestinationRecord> {
        self.destinations.iter().filter(|d| d.is_active)
    }
}

/// One backend address within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub id: Uuid,
    pub destination_id: String,
    /// Network address; `None` or blank when the row was saved without one.
    pub address: Option<String>,
    pub is_active: bool,
    pub audit: Audit,
}

/// The slice of a cluster a route needs to resolve its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub id: Uuid,
    pub cluster_id: String,
    pub is_active: bool,
}

/// A request-matching rule bound to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: Uuid,
    pub route_id: String,
    pub path: String,
    pub methods: Vec<String>,
    pub rate_limiter_policy: Option<String>,
    /// `None` when the foreign key no longer resolves.
    pub cluster: Option<ClusterRef>,
    pub is_active: bool,
    pub audit: Audit,
    pub headers: Vec<HeaderRecord>,
    /// Ordered by `sort_order`.
    pub transforms: Vec<TransformRecord>,
}

/// Header match rule. `mode` is kept as free text and parsed at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub id: Uuid,
    pub name: String,
    pub values: Vec<String>,
    pub mode: String,
    pub is_active: bool,
}

/// Path rewrite applied to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub id: Uuid,
    pub path_pattern: String,
    pub sort_order: i64,
    pub is_active: bool,
}

// --- Write-side inputs ---

/// Destination supplied on cluster create, or upserted on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationInput {
    pub destination_id: String,
    pub address: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCluster {
    pub cluster_id: String,
    pub load_balancing_policy: Option<String>,
    pub health_check: HealthCheckSettings,
    pub is_active: bool,
    pub destinations: Vec<DestinationInput>,
    pub actor: Option<String>,
}

/// Partial cluster update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterChanges {
    pub cluster_id: Option<String>,
    pub load_balancing_policy: Option<String>,
    pub health_check_enabled: Option<bool>,
    pub health_check_path: Option<String>,
    pub health_check_interval_secs: Option<i64>,
    pub health_check_timeout_secs: Option<i64>,
    pub is_active: Option<bool>,
    /// When present, the full desired destination set: listed ids are
    /// upserted and every other destination of the cluster is deleted.
    pub destinations: Option<Vec<DestinationInput>>,
    /// Destination ids removed before `destinations` is applied.
    pub remove_destinations: Vec<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInput {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoute {
    pub route_id: String,
    pub path: String,
    pub methods: Vec<String>,
    pub rate_limiter_policy: Option<String>,
    /// Surrogate id of the owning cluster.
    pub cluster: Uuid,
    pub is_active: bool,
    pub headers: Vec<HeaderInput>,
    /// Path patterns, in application order.
    pub transforms: Vec<String>,
    pub actor: Option<String>,
}

/// Partial route update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteChanges {
    pub route_id: Option<String>,
    pub path: Option<String>,
    pub methods: Option<Vec<String>>,
    pub rate_limiter_policy: Option<String>,
    pub cluster: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Upserted by name; headers not listed are deleted.
    pub headers: Option<Vec<HeaderInput>>,
    /// Upserted by pattern in the given order; patterns not listed are deleted.
    pub transforms: Option<Vec<String>>,
    pub remove_headers: Vec<String>,
    pub remove_transforms: Vec<String>,
    pub actor: Option<String>,
}

/// Header mode stored when a request leaves it out.
pub const DEFAULT_HEADER_MODE: &str = "ExactHeader";

fn default_true() -> bool {
    true
}

// --- Pagination ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based.
    pub page_number: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number: page_number.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page_number as i64 - 1) * self.page_size as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.page_size == 0 {
            return 0;
        }
        (self.total_count + self.page_size as i64 - 1) / self.page_size as i64
    }
}
