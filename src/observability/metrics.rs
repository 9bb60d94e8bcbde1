//! Metrics collection and exposition.
//!
//! # Metrics
//! - `airdrop_batches_submitted_total` (counter): by chain family
//! - `airdrop_batches_settled_total` (counter): by chain family, outcome
//! - `airdrop_recipients_settled_total` (counter): by outcome
//! - `airdrop_confirmation_seconds` (histogram): submit-to-settle latency
//! - `airdrop_active_campaigns` (gauge): campaigns currently SENDING
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for chain family and settlement outcome
//! - Exporter is optional; recording into an uninstalled recorder is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record a batch transfer submission.
pub fn record_batch_submitted(family: &str) {
    metrics::counter!("airdrop_batches_submitted_total", "family" => family.to_string())
        .increment(1);
}

/// Record a settled batch and the recipients it covered.
pub fn record_batch_settled(family: &str, outcome: &str, recipients: u64) {
    metrics::counter!(
        "airdrop_batches_settled_total",
        "family" => family.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
    metrics::counter!("airdrop_recipients_settled_total", "outcome" => outcome.to_string())
        .increment(recipients);
}

/// Record submit-to-settle latency for one batch.
pub fn record_confirmation_latency(family: &str, seconds: f64) {
    metrics::histogram!("airdrop_confirmation_seconds", "family" => family.to_string())
        .record(seconds);
}

/// Track the number of campaigns with an active run.
pub fn campaign_started() {
    metrics::gauge!("airdrop_active_campaigns").increment(1.0);
}

/// Counterpart to [`campaign_started`].
pub fn campaign_stopped() {
    metrics::gauge!("airdrop_active_campaigns").decrement(1.0);
}
