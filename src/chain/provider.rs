//! JSON-RPC chain client with multi-endpoint failover

use super::{ChainCall, ChainClient, ChainError, ChainId, ChainResult};
use crate::balance::YieldBalance;
use crate::config::ChainConfig;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stablecoin amounts travel as integer micro-units
const STABLECOIN_UNIT: f64 = 1e6;
/// Bitcoin amounts travel as satoshis
const SATS_PER_BTC: f64 = 1e8;

/// Server-defined error codes
const ERR_INVALID_ACCOUNT: i64 = -32010;
const ERR_CALL_REJECTED: i64 = -32020;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    chain: ChainId,
    #[serde(default)]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    stablecoin_micros: u128,
    #[serde(default)]
    bitcoin_sats: u64,
    #[serde(default)]
    cumulative_yield_micros: u128,
    #[serde(default)]
    last_conversion_at: Option<DateTime<Utc>>,
}

impl BalanceResponse {
    fn into_balance(self) -> YieldBalance {
        YieldBalance {
            stablecoin_balance: self.stablecoin_micros as f64 / STABLECOIN_UNIT,
            bitcoin_balance: self.bitcoin_sats as f64 / SATS_PER_BTC,
            cumulative_yield: self.cumulative_yield_micros as f64 / STABLECOIN_UNIT,
            last_conversion_at: self.last_conversion_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    reference: Option<String>,
}

fn to_micros(amount: f64) -> u128 {
    (amount * STABLECOIN_UNIT).round() as u128
}

/// Request params for a state-changing call, with amounts in micro-units
fn wire_params(call: &ChainCall) -> Value {
    match call {
        ChainCall::Deposit { amount, currency } => json!({
            "amount_micros": to_micros(*amount),
            "currency": currency,
        }),
        ChainCall::SkimYield { destination } => json!({ "destination": destination }),
        ChainCall::ConvertToBitcoin { principal, amount } => json!({
            "principal": principal,
            "amount_micros": to_micros(*amount),
        }),
        ChainCall::BridgeTransfer {
            amount,
            recipient,
            destination,
            gateway,
        } => json!({
            "amount_micros": to_micros(*amount),
            "recipient": recipient,
            "destination": destination,
            "gateway": gateway,
        }),
    }
}

/// Multi-endpoint JSON-RPC client for one ledger
pub struct RpcChainClient {
    chain: ChainId,
    http: Client,
    endpoints: Vec<String>,
    /// Current active endpoint index
    current_endpoint: AtomicUsize,
    request_id: AtomicU64,
}

impl RpcChainClient {
    /// Create a new chain client
    pub fn new(chain: ChainId, config: &ChainConfig) -> ChainResult<Self> {
        if config.rpc_urls.is_empty() {
            return Err(ChainError::Unreachable(format!(
                "no RPC endpoints configured for {}",
                chain
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ChainError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        for url in &config.rpc_urls {
            debug!("Added RPC endpoint for {} chain: {}", chain, url);
        }

        Ok(Self {
            chain,
            http,
            endpoints: config.rpc_urls.clone(),
            current_endpoint: AtomicUsize::new(0),
            request_id: AtomicU64::new(1),
        })
    }

    /// Get the active endpoint
    fn endpoint(&self) -> &str {
        let idx = self.current_endpoint.load(Ordering::Relaxed);
        &self.endpoints[idx % self.endpoints.len()]
    }

    /// Switch to next available endpoint
    fn failover(&self) {
        let current = self.current_endpoint.load(Ordering::Relaxed);
        let next = (current + 1) % self.endpoints.len();
        self.current_endpoint.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to endpoint {}", self.chain, next);
    }

    /// Issue one JSON-RPC request against the active endpoint
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Unreachable(format!(
                "{} answered {} with HTTP {}",
                self.endpoint(),
                method,
                status
            )));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(match err.code {
                ERR_INVALID_ACCOUNT => ChainError::InvalidAccount(err.message),
                ERR_CALL_REJECTED => ChainError::Rejected(err.message),
                code => ChainError::Rpc {
                    code,
                    message: err.message,
                },
            });
        }

        body.result
            .ok_or_else(|| ChainError::Decode(format!("{} returned no result", method)))
    }

    /// Read-only request, retried across endpoints on transport failure
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let mut last_error = None;

        for _ in 0..self.endpoints.len() {
            match self.call(method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(ChainError::Unreachable(message)) => {
                    warn!(
                        "Failed {} on chain {}: {}",
                        method, self.chain, message
                    );
                    last_error = Some(ChainError::Unreachable(message));
                    self.failover();
                }
                Err(other) => return Err(other),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ChainError::Unreachable(format!("all endpoints failed for {}", method))
        }))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> ChainResult<()> {
        let status: StatusResponse = self.read("yield_status", json!({})).await?;

        if status.chain != self.chain {
            return Err(ChainError::Rejected(format!(
                "endpoint serves the {} chain, expected {}",
                status.chain, self.chain
            )));
        }

        info!("Connected to {} chain at height {}", self.chain, status.height);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.read::<StatusResponse>("yield_status", json!({})).await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain, e);
                false
            }
        }
    }

    async fn query_balance(&self, account: &str) -> ChainResult<YieldBalance> {
        let balance: BalanceResponse = self
            .read("yield_balance", json!({ "account": account }))
            .await?;
        Ok(balance.into_balance())
    }

    async fn submit(&self, call: ChainCall) -> ChainResult<Option<String>> {
        // State-changing calls are sent once, to the active endpoint only
        match self.call::<SubmitResponse>(call.name(), wire_params(&call)).await {
            Ok(response) => {
                debug!(
                    "Submitted {} on chain {}: {:?}",
                    call.name(),
                    self.chain,
                    response.reference
                );
                Ok(response.reference)
            }
            Err(ChainError::Unreachable(message)) => {
                self.failover();
                Err(ChainError::Unreachable(message))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str]) -> ChainConfig {
        ChainConfig {
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            request_timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_requires_an_endpoint() {
        assert!(RpcChainClient::new(ChainId::Custody, &config(&[])).is_err());
    }

    #[test]
    fn test_failover_cycles_endpoints() {
        let client =
            RpcChainClient::new(ChainId::Finance, &config(&["http://a", "http://b"])).unwrap();

        assert_eq!(client.endpoint(), "http://a");
        client.failover();
        assert_eq!(client.endpoint(), "http://b");
        client.failover();
        assert_eq!(client.endpoint(), "http://a");
    }

    #[test]
    fn test_balance_units_are_converted() {
        let response: BalanceResponse = serde_json::from_value(json!({
            "stablecoin_micros": 1_000_000_000u64,
            "bitcoin_sats": 1_000_000u64,
            "cumulative_yield_micros": 150_500_000u64,
        }))
        .unwrap();

        let balance = response.into_balance();
        assert_eq!(balance.stablecoin_balance, 1000.0);
        assert_eq!(balance.bitcoin_balance, 0.01);
        assert_eq!(balance.cumulative_yield, 150.5);
        assert!(balance.last_conversion_at.is_none());
    }

    #[test]
    fn test_rpc_error_body_parses() {
        let response: RpcResponse<SubmitResponse> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": ERR_CALL_REJECTED, "message": "vault paused" }
        }))
        .unwrap();

        assert!(response.result.is_none());
        let err = response.error.unwrap();
        assert_eq!(err.code, ERR_CALL_REJECTED);
        assert_eq!(err.message, "vault paused");
    }

    #[test]
    fn test_submit_amounts_travel_as_micros() {
        let convert = wire_params(&ChainCall::ConvertToBitcoin {
            principal: "aaaaa-aa".to_string(),
            amount: 45.67,
        });
        assert_eq!(convert, json!({ "principal": "aaaaa-aa", "amount_micros": 45_670_000u64 }));

        let bridge = wire_params(&ChainCall::BridgeTransfer {
            amount: 12.5,
            recipient: "aaaaa-aa".to_string(),
            destination: ChainId::Custody,
            gateway: "axelar".to_string(),
        });
        assert_eq!(bridge["amount_micros"], 12_500_000u64);
        assert_eq!(bridge["destination"], "custody");
        assert_eq!(bridge["gateway"], "axelar");

        let deposit = wire_params(&ChainCall::Deposit {
            amount: 0.1 + 0.2,
            currency: "USDC".to_string(),
        });
        assert_eq!(deposit["amount_micros"], 300_000u64);

        let skim = wire_params(&ChainCall::SkimYield {
            destination: ChainId::Custody,
        });
        assert_eq!(skim, json!({ "destination": "custody" }));
    }

    /// Serves `yield_status` on the second route only; the first answers 502
    async fn spawn_rpc_pair(chain: &'static str) -> (String, String) {
        use axum::{http::StatusCode, routing::post, Json, Router};

        let app = Router::new()
            .route("/down", post(|| async { StatusCode::BAD_GATEWAY }))
            .route(
                "/up",
                post(move || async move {
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "result": { "chain": chain, "height": 7 }
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/down", addr), format!("http://{}/up", addr))
    }

    #[tokio::test]
    async fn test_http_error_status_fails_over_to_next_endpoint() {
        let (down, up) = spawn_rpc_pair("finance").await;
        let client =
            RpcChainClient::new(ChainId::Finance, &config(&[down.as_str(), up.as_str()])).unwrap();

        client.connect().await.unwrap();
        assert_eq!(client.endpoint(), up);
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_http_error_status_is_unreachable() {
        let (down, _) = spawn_rpc_pair("custody").await;
        let client = RpcChainClient::new(ChainId::Custody, &config(&[down.as_str()])).unwrap();

        let err = client
            .submit(ChainCall::SkimYield {
                destination: ChainId::Custody,
            })
            .await
            .unwrap_err();
        match err {
            ChainError::Unreachable(message) => assert!(message.contains("502")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_fail_health_check() {
        let client = RpcChainClient::new(ChainId::Custody, &config(&["http://127.0.0.1:1"])).unwrap();
        assert!(!client.health_check().await);
    }
}
