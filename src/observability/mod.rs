//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (refresh counters, snapshot gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (cluster_id, route_id, revision) on every event
//! - Metrics are cheap and no-ops until an exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
pub use self::metrics::{init_metrics, MetricsError};
