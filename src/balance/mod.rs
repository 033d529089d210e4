//! Per-chain yield balances and their aggregation into portfolio totals

use crate::chain::ChainId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Yield position held on one chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YieldBalance {
    pub stablecoin_balance: f64,
    /// Only meaningful on the custody chain
    pub bitcoin_balance: f64,
    pub cumulative_yield: f64,
    pub last_conversion_at: Option<DateTime<Utc>>,
}

/// A balance report that was excluded from the totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceAnomaly {
    pub chain: ChainId,
    pub reason: String,
}

/// Unified totals across every chain
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedBalance {
    pub total_stablecoin: f64,
    pub total_bitcoin: f64,
    pub total_yield: f64,
    pub latest_conversion: Option<DateTime<Utc>>,
    pub per_chain: BTreeMap<ChainId, YieldBalance>,
    pub anomalies: Vec<BalanceAnomaly>,
}

/// Merges per-chain balances. Holds no state; every call is a pure function of its input.
pub struct BalanceAggregator;

impl BalanceAggregator {
    /// Aggregate one balance per chain
    pub fn aggregate(balances: &BTreeMap<ChainId, YieldBalance>) -> AggregatedBalance {
        let mut totals = AggregatedBalance {
            per_chain: balances.clone(),
            ..Default::default()
        };

        for (chain, balance) in balances {
            totals.total_stablecoin += balance.stablecoin_balance;
            totals.total_yield += balance.cumulative_yield;

            if *chain == ChainId::Custody {
                totals.total_bitcoin += balance.bitcoin_balance;
            } else if balance.bitcoin_balance != 0.0 {
                warn!(
                    "Chain {} reported a bitcoin balance of {}; excluded from totals",
                    chain, balance.bitcoin_balance
                );
                totals.anomalies.push(BalanceAnomaly {
                    chain: *chain,
                    reason: format!(
                        "non-custody chain reported bitcoin balance {}",
                        balance.bitcoin_balance
                    ),
                });
            }

            totals.latest_conversion = match (totals.latest_conversion, balance.last_conversion_at) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        totals
    }

    /// Aggregate raw reports that may mention a chain more than once.
    ///
    /// The first report per chain wins; later ones are dropped so a chain reached
    /// through several providers is only counted once.
    pub fn from_reports<I>(reports: I) -> AggregatedBalance
    where
        I: IntoIterator<Item = (ChainId, YieldBalance)>,
    {
        let mut per_chain = BTreeMap::new();

        for (chain, balance) in reports {
            if per_chain.contains_key(&chain) {
                debug!("Ignoring duplicate balance report for chain {}", chain);
                continue;
            }
            per_chain.insert(chain, balance);
        }

        Self::aggregate(&per_chain)
    }
}
