//! Background refresh subsystem.
//!
//! # Data Flow
//! ```text
//! interval tick ──→ ConfigProvider::update(Scheduled)
//!                        Ok  → new snapshot published
//!                        Err → logged, retried next tick
//! shutdown ───────→ loop exits after any in-flight update
//! ```
//!
//! # Design Decisions
//! - Fixed delay, no backoff: the database may be fixed out of band and the
//!   next tick should pick it up promptly
//! - Shares the provider's update lock with on-demand refreshes, so ticks
//!   and writes never publish out of order

pub mod scheduler;

pub use scheduler::RefreshScheduler;
