//! Prometheus metrics for the relay
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec,
};

lazy_static! {
    // Origin-side metrics
    pub static ref LOGS_RECEIVED: CounterVec = register_counter_vec!(
        "mulberry_logs_received_total",
        "Total number of contract logs received from origin chains",
        &["network"]
    ).unwrap();

    pub static ref LATEST_LOG_BLOCK: GaugeVec = register_gauge_vec!(
        "mulberry_latest_log_block",
        "Block number of the most recent log received",
        &["network"]
    ).unwrap();

    pub static ref RECONNECTS: CounterVec = register_counter_vec!(
        "mulberry_reconnects_total",
        "Total number of listener dial or subscription failures",
        &["network"]
    ).unwrap();

    pub static ref IN_FLIGHT: GaugeVec = register_gauge_vec!(
        "mulberry_in_flight",
        "Logs currently waiting for finality or being relayed",
        &["network"]
    ).unwrap();

    // Relay outcome metrics
    pub static ref EVENTS_RELAYED: CounterVec = register_counter_vec!(
        "mulberry_events_relayed_total",
        "Total number of events submitted to the destination chain",
        &["network", "event"]
    ).unwrap();

    pub static ref RELAY_FAILURES: CounterVec = register_counter_vec!(
        "mulberry_relay_failures_total",
        "Total number of abandoned events by pipeline stage",
        &["network", "stage"]
    ).unwrap();

    pub static ref FEES_PAID: CounterVec = register_counter_vec!(
        "mulberry_fees_paid_total",
        "Total fees attached to relayed messages (in base units)",
        &["network"]
    ).unwrap();

    pub static ref CALLBACKS: CounterVec = register_counter_vec!(
        "mulberry_callbacks_total",
        "Completion callbacks by outcome",
        &["network", "status"]
    ).unwrap();

    // Processing latency
    pub static ref RELAY_LATENCY: HistogramVec = register_histogram_vec!(
        "mulberry_relay_latency_seconds",
        "Time from finality to destination submission",
        &["network"],
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "mulberry_up",
        "Whether the relay is up and running"
    ).unwrap();
}

/// Record a log received on a network
pub fn record_log_received(network: &str, block_number: u64) {
    LOGS_RECEIVED.with_label_values(&[network]).inc();
    LATEST_LOG_BLOCK
        .with_label_values(&[network])
        .set(block_number as f64);
}

pub fn record_reconnect(network: &str) {
    RECONNECTS.with_label_values(&[network]).inc();
}

pub fn inc_in_flight(network: &str) {
    IN_FLIGHT.with_label_values(&[network]).inc();
}

pub fn dec_in_flight(network: &str) {
    IN_FLIGHT.with_label_values(&[network]).dec();
}

/// Record a successful submission
pub fn record_relayed(network: &str, event: &str, fee: u128, latency_secs: f64) {
    EVENTS_RELAYED.with_label_values(&[network, event]).inc();
    FEES_PAID.with_label_values(&[network]).inc_by(fee as f64);
    RELAY_LATENCY
        .with_label_values(&[network])
        .observe(latency_secs);
}

/// Record an abandoned event
pub fn record_failure(network: &str, stage: &str) {
    RELAY_FAILURES.with_label_values(&[network, stage]).inc();
}

pub fn record_callback(network: &str, delivered: bool) {
    let status = if delivered { "delivered" } else { "failed" };
    CALLBACKS.with_label_values(&[network, status]).inc();
}
