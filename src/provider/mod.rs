//! Live routing configuration subsystem.
//!
//! # Data Flow
//! ```text
//! update(trigger)                      (on-demand, scheduled, manual)
//!     → wait for update lock           (one rebuild at a time)
//!     → SnapshotBuilder::build()
//!         Err → log + metrics, current snapshot untouched, no token fired
//!         Ok  → RoutingSnapshot { revision + 1, new ChangeToken }
//!             → ArcSwap store          (readers switch atomically)
//!             → previous token fires   (engines re-read get_config())
//!
//! get_config()
//!     → ArcSwap load                   (lock-free, never empty)
//! ```
//!
//! # Design Decisions
//! - Snapshot and its token travel together in one Arc, so a reader can
//!   never pair a table with another revision's token
//! - The provider is an ordinary value owned by the caller, not a global
//! - Revisions only move forward; a failed build leaves them alone

pub mod change_token;
pub mod config_provider;

pub use change_token::ChangeToken;
pub use config_provider::{
    ConfigProvider, RefreshFailure, RefreshTrigger, RoutingConfigSource, RoutingSnapshot,
};
