//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Quote requests and per-provider outcomes
//! - Provider latency
//! - Auto-refreshes and discarded stale results
//! - Transaction execution outcomes

use crate::chain::ProviderId;
use crate::error::ErrorKind;

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Quote metrics
    pub static ref QUOTE_REQUESTS: CounterVec = register_counter_vec!(
        "bridge_quote_requests_total",
        "Total quote requests by route",
        &["source_chain", "destination_chain"]
    ).unwrap();

    pub static ref PROVIDER_QUOTES: CounterVec = register_counter_vec!(
        "bridge_provider_quotes_total",
        "Provider quote results by outcome",
        &["provider", "outcome"]
    ).unwrap();

    pub static ref PROVIDER_LATENCY: HistogramVec = register_histogram_vec!(
        "bridge_provider_quote_latency_seconds",
        "Provider quote latency",
        &["provider"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref QUOTE_REFRESHES: CounterVec = register_counter_vec!(
        "bridge_quote_refreshes_total",
        "Total auto-refreshed quotes",
        &["provider"]
    ).unwrap();

    pub static ref STALE_DISCARDS: CounterVec = register_counter_vec!(
        "bridge_stale_quotes_discarded_total",
        "Quote results discarded because their request was superseded",
        &[]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_transactions_submitted_total",
        "Total transactions submitted",
        &["provider"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "bridge_transactions_confirmed_total",
        "Total transactions confirmed",
        &["provider"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "bridge_transactions_failed_total",
        "Total transactions failed by error kind",
        &["provider", "kind"]
    ).unwrap();

    pub static ref TX_STATUS_TIMEOUTS: CounterVec = register_counter_vec!(
        "bridge_transaction_status_timeouts_total",
        "Transactions still pending when status polling gave up",
        &["provider"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", addr))?;
        axum::serve(listener, app)
            .await
            .context("Metrics server failed")?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_quote_request(source_chain: &str, destination_chain: &str) {
    QUOTE_REQUESTS
        .with_label_values(&[source_chain, destination_chain])
        .inc();
}

pub fn record_provider_quote(provider: &ProviderId, outcome: &str, latency_secs: f64) {
    PROVIDER_QUOTES
        .with_label_values(&[provider.as_str(), outcome])
        .inc();
    PROVIDER_LATENCY
        .with_label_values(&[provider.as_str()])
        .observe(latency_secs);
}

pub fn record_quote_refresh(provider: &ProviderId) {
    QUOTE_REFRESHES
        .with_label_values(&[provider.as_str()])
        .inc();
}

pub fn record_stale_discard() {
    STALE_DISCARDS.with_label_values(&[]).inc();
}

pub fn record_tx_submitted(provider: &ProviderId) {
    TX_SUBMITTED
        .with_label_values(&[provider.as_str()])
        .inc();
}

pub fn record_tx_confirmed(provider: &ProviderId) {
    TX_CONFIRMED
        .with_label_values(&[provider.as_str()])
        .inc();
}

pub fn record_tx_failed(provider: &ProviderId, kind: ErrorKind) {
    TX_FAILED
        .with_label_values(&[provider.as_str(), kind.as_str()])
        .inc();
}

pub fn record_status_timeout(provider: &ProviderId) {
    TX_STATUS_TIMEOUTS
        .with_label_values(&[provider.as_str()])
        .inc();
}
