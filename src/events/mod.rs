//! Transaction status events
//!
//! Every lifecycle step of a dispatched operation is broadcast so the
//! presentation layer can observe status changes without polling.

use crate::coordination::{CrossChainTransaction, TransactionId, TransactionStatus};

use serde::Serialize;

/// Events emitted by the transaction ledger
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransactionEvent {
    /// Record created with status pending
    Dispatched { transaction: CrossChainTransaction },

    /// Chain call succeeded
    Completed { transaction: CrossChainTransaction },

    /// Chain call failed; the record is retained
    Failed {
        transaction: CrossChainTransaction,
        reason: String,
    },
}

impl TransactionEvent {
    pub fn transaction(&self) -> &CrossChainTransaction {
        match self {
            TransactionEvent::Dispatched { transaction }
            | TransactionEvent::Completed { transaction }
            | TransactionEvent::Failed { transaction, .. } => transaction,
        }
    }

    pub fn tx_id(&self) -> &TransactionId {
        &self.transaction().id
    }

    pub fn status(&self) -> TransactionStatus {
        self.transaction().status
    }

    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            TransactionEvent::Dispatched { .. } => "transaction_dispatched",
            TransactionEvent::Completed { .. } => "transaction_completed",
            TransactionEvent::Failed { .. } => "transaction_failed",
        }
    }

    /// Whether the transaction reached a final status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionEvent::Dispatched { .. })
    }
}
