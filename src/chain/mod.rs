//! Chain module - connections to the custody and finance ledgers
//!
//! This module provides:
//! - The [`ChainClient`] seam every ledger operation goes through
//! - A JSON-RPC client with endpoint failover
//! - A registry of connected chains with health probing

pub mod provider;

pub use provider::RpcChainClient;

use crate::balance::YieldBalance;
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// The two ledgers the relayer spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    /// Holds Bitcoin balances and the yield-to-Bitcoin conversion logic
    Custody,
    /// Holds stablecoin deposits and APY accrual
    Finance,
}

impl ChainId {
    pub const ALL: [ChainId; 2] = [ChainId::Custody, ChainId::Finance];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Custody => "custody",
            ChainId::Finance => "finance",
        }
    }

    /// The chain on the other side of the bridge
    pub fn counterpart(&self) -> ChainId {
        match self {
            ChainId::Custody => ChainId::Finance,
            ChainId::Finance => ChainId::Custody,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custody" => Ok(ChainId::Custody),
            "finance" => Ok(ChainId::Finance),
            other => Err(format!("unknown chain: {}", other)),
        }
    }
}

/// Errors raised by a chain client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("chain unreachable: {0}")]
    Unreachable(String),

    #[error("call rejected: {0}")]
    Rejected(String),

    #[error("account {0} is not valid on this chain")]
    InvalidAccount(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// A state-changing call submitted to one ledger
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCall {
    /// Move stablecoins into yield-bearing custody
    Deposit { amount: f64, currency: String },
    /// Sweep accrued interest towards `destination`
    SkimYield { destination: ChainId },
    /// Convert stablecoin yield held by `principal` into Bitcoin
    ConvertToBitcoin { principal: String, amount: f64 },
    /// Relay value to `recipient` on `destination` via the bridge gateway
    BridgeTransfer {
        amount: f64,
        recipient: String,
        destination: ChainId,
        gateway: String,
    },
}

impl ChainCall {
    pub fn name(&self) -> &'static str {
        match self {
            ChainCall::Deposit { .. } => "deposit",
            ChainCall::SkimYield { .. } => "skim_yield",
            ChainCall::ConvertToBitcoin { .. } => "convert_to_bitcoin",
            ChainCall::BridgeTransfer { .. } => "bridge_transfer",
        }
    }
}

/// Client for a single ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Which ledger this client talks to
    fn chain(&self) -> ChainId;

    /// Establish connectivity; called once during orchestrator initialization
    async fn connect(&self) -> ChainResult<()>;

    /// Cheap liveness probe
    async fn health_check(&self) -> bool;

    /// Read the yield balance held by `account`
    async fn query_balance(&self, account: &str) -> ChainResult<YieldBalance>;

    /// Submit a state-changing call, returning the chain's reference for it
    async fn submit(&self, call: ChainCall) -> ChainResult<Option<String>>;
}

/// Registry of chain clients indexed by chain
pub struct ChainManager {
    clients: DashMap<ChainId, Arc<dyn ChainClient>>,
}

impl ChainManager {
    /// Create a chain manager from one client per chain
    pub fn new(clients: Vec<Arc<dyn ChainClient>>) -> OrchestratorResult<Self> {
        let registry = DashMap::new();

        for client in clients {
            let chain = client.chain();
            if registry.insert(chain, client).is_some() {
                return Err(OrchestratorError::Config(format!(
                    "Duplicate client registered for chain {}",
                    chain
                )));
            }
            info!("Registered client for {} chain", chain);
        }

        for chain in ChainId::ALL {
            if !registry.contains_key(&chain) {
                return Err(OrchestratorError::Config(format!(
                    "No client registered for chain {}",
                    chain
                )));
            }
        }

        Ok(Self { clients: registry })
    }

    /// Get the client for a specific chain
    pub fn client(&self, chain: ChainId) -> OrchestratorResult<Arc<dyn ChainClient>> {
        self.clients
            .get(&chain)
            .map(|c| c.clone())
            .ok_or_else(|| OrchestratorError::Internal(format!("chain {} not registered", chain)))
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(ChainId, bool)> {
        let checks = ChainId::ALL.into_iter().filter_map(|chain| {
            self.clients.get(&chain).map(|c| {
                let client = c.clone();
                async move { (chain, client.health_check().await) }
            })
        });

        let results = futures::future::join_all(checks).await;

        for (chain, healthy) in &results {
            if !healthy {
                warn!("Chain {} health check failed", chain);
            }
            crate::metrics::record_chain_health(*chain, *healthy);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_for(chain: ChainId, healthy: bool) -> Arc<dyn ChainClient> {
        let mut mock = MockChainClient::new();
        mock.expect_chain().return_const(chain);
        mock.expect_health_check().returning(move || healthy);
        Arc::new(mock)
    }

    #[test]
    fn test_chain_id_round_trips_through_str() {
        for chain in ChainId::ALL {
            assert_eq!(chain.as_str().parse::<ChainId>().unwrap(), chain);
        }
        assert!("ethereum".parse::<ChainId>().is_err());
        assert_eq!(ChainId::Finance.counterpart(), ChainId::Custody);
    }

    #[test]
    fn test_manager_requires_both_chains() {
        let err = ChainManager::new(vec![mock_for(ChainId::Custody, true)])
            .err()
            .expect("missing finance chain");
        assert!(err.to_string().contains("finance"));
    }

    #[test]
    fn test_manager_rejects_duplicate_chain() {
        let result = ChainManager::new(vec![
            mock_for(ChainId::Custody, true),
            mock_for(ChainId::Custody, true),
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_check_reports_each_chain() {
        let manager = ChainManager::new(vec![
            mock_for(ChainId::Custody, true),
            mock_for(ChainId::Finance, false),
        ])
        .unwrap();

        let health = manager.health_check().await;
        assert_eq!(health, vec![(ChainId::Custody, true), (ChainId::Finance, false)]);
    }
}
