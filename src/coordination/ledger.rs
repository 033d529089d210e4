//! Transaction ledger - history and lifecycle of every dispatched operation

use super::transaction::{CrossChainTransaction, NewTransaction, TransactionId, TransactionStatus};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::TransactionEvent;

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct LedgerInner {
    records: HashMap<TransactionId, CrossChainTransaction>,
    /// Insertion order, oldest first
    order: Vec<TransactionId>,
}

/// Transaction statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Append-only store of transaction records.
///
/// Records enter as pending and are transitioned at most once. Mutators are
/// crate-private so only the orchestrator's dispatch path can drive them.
pub struct TransactionLedger {
    inner: RwLock<LedgerInner>,
    event_tx: broadcast::Sender<TransactionEvent>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(LedgerInner::default()),
            event_tx,
        }
    }

    /// Open a pending record under a fresh id
    pub(crate) async fn record_pending(&self, draft: NewTransaction) -> CrossChainTransaction {
        let mut inner = self.inner.write().await;

        let mut id = TransactionId::generate();
        while inner.records.contains_key(&id) {
            warn!("Transaction id collision on {}, regenerating", id);
            id = TransactionId::generate();
        }

        let record = draft.into_pending(id.clone());
        inner.records.insert(id.clone(), record.clone());
        inner.order.push(id);
        drop(inner);

        debug!("Recorded pending {} {}", record.operation, record.id);
        self.publish(TransactionEvent::Dispatched {
            transaction: record.clone(),
        });
        record
    }

    pub(crate) async fn mark_completed(
        &self,
        tx_id: &TransactionId,
        external_reference: Option<String>,
    ) -> OrchestratorResult<CrossChainTransaction> {
        let record = self
            .transition(tx_id, TransactionStatus::Completed, |tx| {
                tx.external_reference = external_reference;
            })
            .await?;

        self.publish(TransactionEvent::Completed {
            transaction: record.clone(),
        });
        Ok(record)
    }

    pub(crate) async fn mark_failed(
        &self,
        tx_id: &TransactionId,
        reason: String,
    ) -> OrchestratorResult<CrossChainTransaction> {
        let stored_reason = reason.clone();
        let record = self
            .transition(tx_id, TransactionStatus::Failed, |tx| {
                tx.failure_reason = Some(stored_reason);
            })
            .await?;

        self.publish(TransactionEvent::Failed {
            transaction: record.clone(),
            reason,
        });
        Ok(record)
    }

    async fn transition<F>(
        &self,
        tx_id: &TransactionId,
        next: TransactionStatus,
        apply: F,
    ) -> OrchestratorResult<CrossChainTransaction>
    where
        F: FnOnce(&mut CrossChainTransaction),
    {
        let mut inner = self.inner.write().await;
        let tx = inner
            .records
            .get_mut(tx_id)
            .ok_or_else(|| OrchestratorError::TransactionNotFound {
                tx_id: tx_id.clone(),
            })?;

        if !tx.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidStateTransition {
                tx_id: tx_id.clone(),
                from: tx.status.to_string(),
                to: next.to_string(),
            });
        }

        tx.status = next;
        tx.updated_at = Utc::now();
        apply(tx);
        Ok(tx.clone())
    }

    fn publish(&self, event: TransactionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.event_tx.subscribe()
    }

    /// Get transaction by ID
    pub async fn get(&self, tx_id: &TransactionId) -> Option<CrossChainTransaction> {
        self.inner.read().await.records.get(tx_id).cloned()
    }

    /// All records, newest first
    pub async fn history(&self) -> Vec<CrossChainTransaction> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    pub async fn stats(&self) -> TransactionStats {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .fold(TransactionStats::default(), |mut stats, tx| {
                match tx.status {
                    TransactionStatus::Pending => stats.pending += 1,
                    TransactionStatus::Completed => stats.completed += 1,
                    TransactionStatus::Failed => stats.failed += 1,
                }
                stats
            })
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use crate::coordination::OperationKind;

    fn deposit(amount: f64) -> NewTransaction {
        NewTransaction {
            operation: OperationKind::Deposit,
            source_chain: ChainId::Finance,
            destination_chain: ChainId::Finance,
            amount,
            currency: "USDC".to_string(),
            initiator: None,
        }
    }

    #[tokio::test]
    async fn test_pending_then_completed() {
        let ledger = TransactionLedger::new();
        let tx = ledger.record_pending(deposit(500.0)).await;
        assert_eq!(tx.status, TransactionStatus::Pending);

        let done = ledger
            .mark_completed(&tx.id, Some("0xabc".to_string()))
            .await
            .unwrap();

        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.external_reference.as_deref(), Some("0xabc"));
        assert_eq!(done.amount, 500.0);
        assert_eq!(ledger.get(&tx.id).await, Some(done));
    }

    #[tokio::test]
    async fn test_terminal_records_are_immutable() {
        let ledger = TransactionLedger::new();
        let tx = ledger.record_pending(deposit(1.0)).await;
        ledger.mark_failed(&tx.id, "boom".to_string()).await.unwrap();

        let err = ledger.mark_completed(&tx.id, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));

        let err = ledger.mark_failed(&tx.id, "again".to_string()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));

        let stored = ledger.get(&tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let ledger = TransactionLedger::new();
        let err = ledger
            .mark_completed(&TransactionId::generate(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::TransactionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_history_newest_first_and_stats() {
        let ledger = TransactionLedger::new();
        let first = ledger.record_pending(deposit(1.0)).await;
        let second = ledger.record_pending(deposit(2.0)).await;
        ledger.mark_completed(&first.id, None).await.unwrap();

        let history = ledger.history().await;
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        assert_eq!(
            ledger.stats().await,
            TransactionStats {
                pending: 1,
                completed: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let ledger = TransactionLedger::new();
        let mut events = ledger.subscribe();

        let tx = ledger.record_pending(deposit(3.0)).await;
        ledger.mark_failed(&tx.id, "rejected".to_string()).await.unwrap();

        let dispatched = events.recv().await.unwrap();
        assert_eq!(dispatched.name(), "transaction_dispatched");
        assert_eq!(dispatched.tx_id(), &tx.id);

        let failed = events.recv().await.unwrap();
        assert!(failed.is_terminal());
        assert_eq!(failed.status(), TransactionStatus::Failed);
    }
}
