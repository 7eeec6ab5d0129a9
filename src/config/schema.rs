//! Settings schema definitions.
//!
//! Operator-facing settings for the control plane. All types derive Serde
//! traits for deserialization from a TOML file; every section falls back
//! to defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::store::HeaderInput;

/// Root settings for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Admin HTTP API.
    pub admin: AdminConfig,

    /// Entity store connection.
    pub database: DatabaseConfig,

    /// Background refresh policy.
    pub refresh: RefreshConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Entities imported into an empty database on first start.
    pub seed: SeedConfig,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Budget for the refresh that follows a write. Must stay below
    /// `request_timeout_secs` so a committed write is always answered.
    pub refresh_timeout_secs: u64,

    /// Upper bound on `page_size` for list endpoints.
    pub max_page_size: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
            refresh_timeout_secs: 10,
            max_page_size: 100,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,

    pub max_connections: u32,

    /// Bound on each snapshot read, in seconds.
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://route-control.db?mode=rwc".to_string(),
            max_connections: 5,
            query_timeout_secs: 10,
        }
    }
}

/// Background refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between scheduled rebuilds.
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON lines instead of the human format.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus scrape listener.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Seed data.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SeedConfig {
    pub clusters: Vec<SeedCluster>,
    pub routes: Vec<SeedRoute>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SeedCluster {
    pub cluster_id: String,

    #[serde(default = "default_load_balancing_policy")]
    pub load_balancing_policy: String,

    #[serde(default)]
    pub health_check: Option<SeedHealthCheck>,

    #[serde(default)]
    pub destinations: Vec<SeedDestination>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SeedHealthCheck {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_path")]
    pub path: String,

    #[serde(default = "default_health_interval")]
    pub interval_secs: i64,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SeedDestination {
    pub destination_id: String,

    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SeedRoute {
    pub route_id: String,

    pub path: String,

    /// External id of the owning cluster.
    pub cluster_id: String,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub rate_limiter_policy: Option<String>,

    #[serde(default)]
    pub headers: Vec<HeaderInput>,

    #[serde(default)]
    pub transforms: Vec<String>,
}

fn default_load_balancing_policy() -> String {
    "RoundRobin".to_string()
}

fn default_health_path() -> String {
    "/healthcheck".to_string()
}

fn default_health_interval() -> i64 {
    30
}

fn default_health_timeout() -> i64 {
    10
}

fn default_true() -> bool {
    true
}
