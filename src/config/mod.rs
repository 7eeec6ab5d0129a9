//! Settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env overrides (ROUTE_CONTROL_*)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → handed to bootstrap, sliced per subsystem
//! ```
//!
//! # Design Decisions
//! - Settings are read once at startup; routing data lives in the database
//!   and is hot-reloaded separately
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, SettingsError};
pub use schema::{
    AdminConfig, DatabaseConfig, ObservabilityConfig, RefreshConfig, SeedCluster, SeedConfig,
    SeedDestination, SeedHealthCheck, SeedRoute, Settings,
};
