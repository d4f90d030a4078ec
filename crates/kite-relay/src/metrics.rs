//! Metrics collection and export for Kite.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use kite_core::{DeliveryReport, Direction, KiteError};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::config::MetricsConfig;

/// Metric names.
pub mod names {
    pub const COMMANDS_TOTAL: &str = "kite_commands_total";
    pub const COMMAND_ERRORS_TOTAL: &str = "kite_command_errors_total";
    pub const MESSAGES_ROUTED_TOTAL: &str = "kite_messages_routed_total";
    pub const DELIVERIES_TOTAL: &str = "kite_deliveries_total";
    pub const DISPATCH_LATENCY_SECONDS: &str = "kite_dispatch_latency_seconds";
    pub const CHANNELS_DROPPED_TOTAL: &str = "kite_channels_dropped_total";
}

/// Describe every metric and, if enabled, start the exporter.
///
/// Returns whether the exporter is running. An exporter that cannot start
/// is logged, the relay keeps running without it.
pub fn init(config: &MetricsConfig) -> bool {
    init_metrics();

    if !config.enabled {
        info!("Metrics export disabled");
        return false;
    }
    match start_metrics_server(config.port) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to start metrics server: {:#}", e);
            false
        }
    }
}

/// Describe every metric.
pub fn init_metrics() {
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Commands handled, by command");
    metrics::describe_counter!(
        names::COMMAND_ERRORS_TOTAL,
        "Commands that ended in an error response, by error kind"
    );
    metrics::describe_counter!(
        names::MESSAGES_ROUTED_TOTAL,
        "Messages routed between members, by direction"
    );
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Payload deliveries to connectors, by outcome"
    );
    metrics::describe_histogram!(
        names::DISPATCH_LATENCY_SECONDS,
        "Time from command submission to the last delivery, in seconds"
    );
    metrics::describe_counter!(names::CHANNELS_DROPPED_TOTAL, "Channels dropped by their host");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics endpoint.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics server on {addr}"))?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_command(command: &'static str) {
    counter!(names::COMMANDS_TOTAL, "command" => command).increment(1);
}

pub fn record_error(error: &KiteError) {
    counter!(names::COMMAND_ERRORS_TOTAL, "kind" => error.kind()).increment(1);
}

pub fn record_routed(direction: Direction) {
    counter!(names::MESSAGES_ROUTED_TOTAL, "direction" => direction.as_str()).increment(1);
}

pub fn record_channel_dropped() {
    counter!(names::CHANNELS_DROPPED_TOTAL).increment(1);
}

/// Record delivery outcomes.
pub fn record_deliveries(reports: &[DeliveryReport]) {
    for report in reports {
        let status = if report.is_delivered() {
            "delivered"
        } else {
            "failed"
        };
        counter!(names::DELIVERIES_TOTAL, "status" => status).increment(1);
    }
}

pub fn record_latency(seconds: f64) {
    histogram!(names::DISPATCH_LATENCY_SECONDS).record(seconds);
}
