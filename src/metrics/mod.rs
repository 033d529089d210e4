//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connectivity
//! - Transaction dispatch outcomes and latency
//! - Wallet connection attempts

use crate::chain::ChainId;
use crate::coordination::OperationKind;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::ProviderKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "yield_relayer_chain_connected",
        "Chain connectivity (1=reachable, 0=unreachable)",
        &["chain"]
    ).expect("chain_connected metric");

    pub static ref TX_DISPATCHED: CounterVec = register_counter_vec!(
        "yield_relayer_transactions_dispatched_total",
        "Total operations dispatched",
        &["operation"]
    ).expect("transactions_dispatched metric");

    pub static ref TX_COMPLETED: CounterVec = register_counter_vec!(
        "yield_relayer_transactions_completed_total",
        "Total operations completed",
        &["operation"]
    ).expect("transactions_completed metric");

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "yield_relayer_transactions_failed_total",
        "Total operations failed",
        &["operation"]
    ).expect("transactions_failed metric");

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "yield_relayer_transaction_latency_seconds",
        "Chain call latency for completed operations",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("transaction_latency metric");

    pub static ref WALLET_CONNECTIONS: CounterVec = register_counter_vec!(
        "yield_relayer_wallet_connections_total",
        "Wallet connection attempts by provider and outcome",
        &["provider", "outcome"]
    ).expect("wallet_connections metric");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> OrchestratorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| OrchestratorError::Config(format!("cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

pub fn record_chain_health(chain: ChainId, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[chain.as_str()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_tx_dispatched(operation: OperationKind) {
    TX_DISPATCHED.with_label_values(&[operation.as_str()]).inc();
}

pub fn record_tx_completed(operation: OperationKind, latency_secs: f64) {
    TX_COMPLETED.with_label_values(&[operation.as_str()]).inc();
    TX_LATENCY
        .with_label_values(&[operation.as_str()])
        .observe(latency_secs);
}

pub fn record_tx_failed(operation: OperationKind) {
    TX_FAILED.with_label_values(&[operation.as_str()]).inc();
}

pub fn record_wallet_connection(provider: ProviderKind, success: bool) {
    let outcome = if success { "connected" } else { "failed" };
    WALLET_CONNECTIONS
        .with_label_values(&[provider.as_str(), outcome])
        .inc();
}
