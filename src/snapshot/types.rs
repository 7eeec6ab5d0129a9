//! Routing table types handed to the proxy engine.
//!
//! Field names serialize in the PascalCase shape YARP-style engines read
//! (`ClusterId`, `Destinations`, `Match`, `Transforms`, ...), so a consumer
//! can deserialize a snapshot straight into its own config types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const HEALTH_ENABLED_KEY: &str = "HealthCheck:Active:Enabled";
pub const HEALTH_PATH_KEY: &str = "HealthCheck:Active:Path";
pub const HEALTH_INTERVAL_KEY: &str = "HealthCheck:Active:Interval";
pub const HEALTH_TIMEOUT_KEY: &str = "HealthCheck:Active:Timeout";

/// Transform key for a path rewrite.
pub const PATH_PATTERN_KEY: &str = "PathPattern";

/// Content of one snapshot: live clusters and the routes that target them.
///
/// Every route's `cluster_id` names a cluster in `clusters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub clusters: Vec<ClusterConfig>,
    pub routes: Vec<RouteConfig>,
}

impl RoutingTable {
    pub fn cluster(&self, cluster_id: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.route_id == route_id)
    }

    /// Routes whose cluster is missing from this table. Empty for any
    /// table produced by the builder.
    pub fn dangling_routes(&self) -> Vec<&RouteConfig> {
        self.routes
            .iter()
            .filter(|r| self.cluster(&r.cluster_id).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterConfig {
    pub cluster_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancing_policy: Option<String>,

    /// Keyed by destination id.
    pub destinations: BTreeMap<String, DestinationConfig>,

    /// Health-check settings under `HealthCheck:Active:*`; empty when
    /// health checking is off.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestinationConfig {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteConfig {
    pub route_id: String,

    /// External id of the target cluster.
    pub cluster_id: String,

    #[serde(rename = "Match")]
    pub route_match: RouteMatch,

    /// Ordered; each entry is a single `PathPattern` rewrite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteMatch {
    pub path: String,

    /// Uppercase, de-duplicated, insertion order kept. Empty matches any method.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderMatch {
    pub name: String,
    pub values: Vec<String>,
    pub mode: HeaderMatchMode,
    pub is_case_sensitive: bool,
}

/// How a header matcher compares request values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderMatchMode {
    #[default]
    ExactHeader,
    HeaderPrefix,
    Exists,
    Contains,
    NotContains,
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown header match mode '{0}'")]
pub struct UnknownHeaderMode(pub String);

impl HeaderMatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderMatchMode::ExactHeader => "ExactHeader",
            HeaderMatchMode::HeaderPrefix => "HeaderPrefix",
            HeaderMatchMode::Exists => "Exists",
            HeaderMatchMode::Contains => "Contains",
            HeaderMatchMode::NotContains => "NotContains",
            HeaderMatchMode::NotExists => "NotExists",
        }
    }

    /// Parse a stored mode, falling back to `ExactHeader` with a warning.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|err: UnknownHeaderMode| {
            tracing::warn!(mode = %err.0, "Unknown header match mode, using ExactHeader");
            HeaderMatchMode::ExactHeader
        })
    }
}

impl FromStr for HeaderMatchMode {
    type Err = UnknownHeaderMode;

    /// Case-insensitive; `_` and `-` separators are ignored so
    /// `header_prefix` and `Header-Prefix` both parse.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match folded.as_str() {
            "exactheader" | "exact" => Ok(HeaderMatchMode::ExactHeader),
            "headerprefix" | "prefix" => Ok(HeaderMatchMode::HeaderPrefix),
            "exists" => Ok(HeaderMatchMode::Exists),
            "contains" => Ok(HeaderMatchMode::Contains),
            "notcontains" => Ok(HeaderMatchMode::NotContains),
            "notexists" => Ok(HeaderMatchMode::NotExists),
            _ => Err(UnknownHeaderMode(raw.to_string())),
        }
    }
}

impl fmt::Display for HeaderMatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
