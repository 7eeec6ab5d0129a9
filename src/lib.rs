//! Database-backed dynamic routing configuration for a reverse proxy.
//!
//! Operators edit clusters and routes through the admin API; every write,
//! every scheduler tick and every manual refresh rebuilds an immutable
//! [`RoutingSnapshot`] and swaps it in atomically. A proxy engine reads
//! through [`RoutingConfigSource`] and waits on the snapshot's
//! [`ChangeToken`] for the next one.

// Core subsystems
pub mod provider;
pub mod refresh;
pub mod snapshot;
pub mod store;

// Outer surfaces
pub mod admin;
pub mod services;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::Settings;
pub use lifecycle::Shutdown;
pub use provider::{ChangeToken, ConfigProvider, RefreshTrigger, RoutingConfigSource, RoutingSnapshot};
pub use snapshot::{RoutingTable, SnapshotBuilder};
pub use store::{EntityStore, SqlStore};
