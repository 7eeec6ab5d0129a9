//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load settings → Logging/metrics → Store + migrations → Seed
//!     → First build (fatal on failure) → Scheduler → Admin listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Admin server drains → Scheduler finishes tick → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: settings first, then core, then listeners
//! - Ordered shutdown: stop accepting, drain, join background tasks

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, ControlPlane, StartupError};
