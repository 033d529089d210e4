//! Cross-chain transaction records

use crate::chain::ChainId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(format!("tx_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    YieldSkim,
    BitcoinConversion,
    Bridge,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::YieldSkim => "yield_skim",
            OperationKind::BitcoinConversion => "bitcoin_conversion",
            OperationKind::Bridge => "bridge",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only pending records may move, and only to a terminal status
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatched operation and its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossChainTransaction {
    pub id: TransactionId,
    pub operation: OperationKind,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reference assigned by the chain (tx hash, block index, ...)
    pub external_reference: Option<String>,
    /// Account of the identity the operation was issued under
    pub initiator: Option<String>,
    pub failure_reason: Option<String>,
}

/// Everything needed to open a pending record
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub operation: OperationKind,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub amount: f64,
    pub currency: String,
    pub initiator: Option<String>,
}

impl NewTransaction {
    pub(crate) fn into_pending(self, id: TransactionId) -> CrossChainTransaction {
        let now = Utc::now();
        CrossChainTransaction {
            id,
            operation: self.operation,
            source_chain: self.source_chain,
            destination_chain: self.destination_chain,
            amount: self.amount,
            currency: self.currency,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
            external_reference: None,
            initiator: self.initiator,
            failure_reason: None,
        }
    }
}
