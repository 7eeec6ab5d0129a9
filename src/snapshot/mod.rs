//! Routing snapshot subsystem.
//!
//! # Data Flow
//! ```text
//! EntityStore
//!     → builder.rs  clusters_with_destinations()   (bounded by read timeout)
//!     → builder.rs  routes_with_relations()        (bounded by read timeout)
//!     → assemble()
//!         active clusters → active destinations with an address
//!         → drop clusters left with none
//!         active routes → only those whose cluster survived
//!         → active headers, active transforms in sort order
//!     → RoutingTable (immutable) + BuildReport (what was left out)
//! ```
//!
//! # Design Decisions
//! - Routes reference clusters by external id, never by surrogate key
//! - Output is sorted by external id so identical inputs give equal tables
//! - Types carry no engine dependency; health settings travel as metadata

pub mod builder;
pub mod types;

pub use builder::{assemble, BuildError, BuildReport, SnapshotBuilder};
pub use types::{
    ClusterConfig, DestinationConfig, HeaderMatch, HeaderMatchMode, RouteConfig, RouteMatch,
    RoutingTable,
};
