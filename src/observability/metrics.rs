//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Describe and record config refresh metrics
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `config_refresh_total` (counter): refreshes by trigger, outcome
//! - `config_refresh_duration_seconds` (histogram): build + swap latency by trigger
//! - `config_snapshot_revision` (gauge): revision currently served
//! - `config_snapshot_clusters` (gauge): clusters in the live snapshot
//! - `config_snapshot_routes` (gauge): routes in the live snapshot
//! - `config_snapshot_excluded_total` (counter): entries left out, by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder
//!   installed every call is a no-op, so tests need no setup
//! - Labels are static strings only

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;

use crate::config::ObservabilityConfig;
use crate::snapshot::BuildReport;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics address '{0}'")]
    Address(String),

    #[error("failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter if enabled and describe every metric.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<(), MetricsError> {
    if !config.metrics_enabled {
        tracing::debug!("Metrics exporter disabled");
        return Ok(());
    }

    let address: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|_| MetricsError::Address(config.metrics_address.clone()))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!(metrics_addr = %address, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("config_refresh_total", "Routing config refresh attempts");
    describe_histogram!(
        "config_refresh_duration_seconds",
        Unit::Seconds,
        "Time to rebuild and publish a routing snapshot"
    );
    describe_gauge!("config_snapshot_revision", "Revision of the live routing snapshot");
    describe_gauge!("config_snapshot_clusters", "Clusters in the live routing snapshot");
    describe_gauge!("config_snapshot_routes", "Routes in the live routing snapshot");
    describe_counter!(
        "config_snapshot_excluded_total",
        "Entities left out of a snapshot during a build"
    );
}

/// Count one refresh attempt and its latency.
pub fn record_refresh(trigger: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("config_refresh_total", "trigger" => trigger, "outcome" => outcome).increment(1);
    histogram!("config_refresh_duration_seconds", "trigger" => trigger).record(duration_secs);
}

/// Publish the shape of the snapshot now being served.
pub fn record_snapshot(revision: u64, clusters: usize, routes: usize) {
    gauge!("config_snapshot_revision").set(revision as f64);
    gauge!("config_snapshot_clusters").set(clusters as f64);
    gauge!("config_snapshot_routes").set(routes as f64);
}

/// Count what a build left out.
pub fn record_exclusions(report: &BuildReport) {
    let kinds = [
        ("cluster", report.excluded_clusters.len()),
        ("destination", report.dropped_destinations.len()),
        ("route", report.dangling_routes.len()),
    ];
    for (kind, count) in kinds {
        if count > 0 {
            counter!("config_snapshot_excluded_total", "kind" => kind).increment(count as u64);
        }
    }
}
