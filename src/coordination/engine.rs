//! Orchestrator for yield operations across the custody and finance chains

use super::ledger::{TransactionLedger, TransactionStats};
use super::transaction::{CrossChainTransaction, NewTransaction, OperationKind, TransactionId};
use crate::balance::YieldBalance;
use crate::chain::{ChainCall, ChainClient, ChainId, ChainManager};
use crate::config::{CrossChainConfig, CrossChainConfigUpdate, OrchestratorConfig};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::TransactionEvent;
use crate::wallet::WalletIdentity;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Limits applied to operation parameters before anything is recorded
#[derive(Debug, Clone)]
struct OperationPolicy {
    default_currency: String,
    supported_currencies: Vec<String>,
    min_deposit: Option<f64>,
}

/// Cross-chain yield orchestrator.
///
/// Every operation except health checks and history lookups is gated on a
/// successful [`initialize`](Self::initialize). Mutating operations follow the
/// same protocol: validate, open a pending record, perform the chain call, then
/// settle the record as completed or failed.
pub struct CrossChainOrchestrator {
    chain_manager: Arc<ChainManager>,
    ledger: Arc<TransactionLedger>,
    config: RwLock<Arc<CrossChainConfig>>,
    policy: OperationPolicy,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl CrossChainOrchestrator {
    pub fn new(chain_manager: Arc<ChainManager>, config: OrchestratorConfig) -> Self {
        Self {
            chain_manager,
            ledger: Arc::new(TransactionLedger::new()),
            config: RwLock::new(Arc::new(config.endpoints)),
            policy: OperationPolicy {
                default_currency: config.default_currency,
                supported_currencies: config.supported_currencies,
                min_deposit: config.min_deposit,
            },
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    /// Connect to the custody chain, then the finance chain.
    ///
    /// Repeat calls after a success are no-ops. Concurrent calls are serialized;
    /// a failure leaves the orchestrator uninitialized.
    pub async fn initialize(&self) -> OrchestratorResult<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        for chain in ChainId::ALL {
            let client = self.chain_manager.client(chain)?;
            client.connect().await.map_err(|source| {
                error!("Failed to connect to {} chain: {}", chain, source);
                OrchestratorError::ChainOperation {
                    chain,
                    tx_id: None,
                    source,
                }
            })?;
            debug!("Connected to {} chain", chain);
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!("Orchestrator initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> OrchestratorResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(OrchestratorError::NotInitialized)
        }
    }

    /// Current endpoint configuration
    pub fn config(&self) -> CrossChainConfig {
        self.snapshot().as_ref().clone()
    }

    fn snapshot(&self) -> Arc<CrossChainConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Merge a partial update; operations already running keep their snapshot
    pub fn update_config(&self, update: CrossChainConfigUpdate) -> CrossChainConfig {
        let mut current = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let merged = current.merged(update);
        *current = Arc::new(merged.clone());
        info!("Cross-chain configuration updated");
        merged
    }

    /// Probe both chains
    pub async fn health_check(&self) -> Vec<(ChainId, bool)> {
        self.chain_manager.health_check().await
    }

    /// Read the yield balance `identity` holds on `chain`
    pub async fn get_balance(
        &self,
        chain: ChainId,
        identity: &WalletIdentity,
    ) -> OrchestratorResult<YieldBalance> {
        self.ensure_initialized()?;

        let client = self.chain_manager.client(chain)?;
        client
            .query_balance(&identity.account)
            .await
            .map_err(|source| OrchestratorError::ChainOperation {
                chain,
                tx_id: None,
                source,
            })
    }

    /// Query each chain at most once, using the first identity native to it
    pub async fn get_balances(
        &self,
        identities: &[WalletIdentity],
    ) -> OrchestratorResult<BTreeMap<ChainId, YieldBalance>> {
        self.ensure_initialized()?;

        let mut balances = BTreeMap::new();
        for chain in ChainId::ALL {
            if let Some(identity) = identities.iter().find(|i| i.chain() == chain) {
                let balance = self.get_balance(chain, identity).await?;
                balances.insert(chain, balance);
            }
        }
        Ok(balances)
    }

    /// Deposit the default stablecoin on `chain`
    pub async fn deposit(
        &self,
        chain: ChainId,
        amount: f64,
    ) -> OrchestratorResult<CrossChainTransaction> {
        let currency = self.policy.default_currency.clone();
        self.deposit_currency(chain, amount, &currency).await
    }

    pub async fn deposit_currency(
        &self,
        chain: ChainId,
        amount: f64,
        currency: &str,
    ) -> OrchestratorResult<CrossChainTransaction> {
        self.ensure_initialized()?;
        validate_amount(amount)?;

        if let Some(min) = self.policy.min_deposit {
            if amount < min {
                return Err(OrchestratorError::Validation(format!(
                    "deposit of {} is below the minimum of {}",
                    amount, min
                )));
            }
        }

        if !self.policy.supported_currencies.iter().any(|c| c == currency) {
            return Err(OrchestratorError::Validation(format!(
                "unsupported currency {}",
                currency
            )));
        }

        let draft = NewTransaction {
            operation: OperationKind::Deposit,
            source_chain: chain,
            destination_chain: chain,
            amount,
            currency: currency.to_string(),
            initiator: None,
        };
        let call = ChainCall::Deposit {
            amount,
            currency: currency.to_string(),
        };

        self.dispatch(draft, chain, call).await
    }

    /// Sweep accrued yield from the finance chain to custody
    pub async fn trigger_yield_skim(&self) -> OrchestratorResult<CrossChainTransaction> {
        self.ensure_initialized()?;

        let draft = NewTransaction {
            operation: OperationKind::YieldSkim,
            source_chain: ChainId::Finance,
            destination_chain: ChainId::Custody,
            amount: 0.0,
            currency: self.policy.default_currency.clone(),
            initiator: None,
        };
        let call = ChainCall::SkimYield {
            destination: ChainId::Custody,
        };

        self.dispatch(draft, ChainId::Finance, call).await
    }

    /// Convert custody-held yield into bitcoin for `identity`
    pub async fn convert_yield_to_bitcoin(
        &self,
        identity: &WalletIdentity,
        amount: f64,
    ) -> OrchestratorResult<CrossChainTransaction> {
        self.ensure_initialized()?;
        validate_amount(amount)?;

        let draft = NewTransaction {
            operation: OperationKind::BitcoinConversion,
            source_chain: ChainId::Custody,
            destination_chain: ChainId::Custody,
            amount,
            currency: self.policy.default_currency.clone(),
            initiator: Some(identity.account.clone()),
        };
        let call = ChainCall::ConvertToBitcoin {
            principal: identity.account.clone(),
            amount,
        };

        self.dispatch(draft, ChainId::Custody, call).await
    }

    /// Move yield from the finance chain to `recipient` on custody via the bridge gateway
    pub async fn bridge_yield_to_other_chain(
        &self,
        amount: f64,
        recipient: &str,
    ) -> OrchestratorResult<CrossChainTransaction> {
        self.ensure_initialized()?;
        validate_amount(amount)?;

        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(OrchestratorError::Validation(
                "bridge recipient must not be empty".to_string(),
            ));
        }

        let gateway = self.snapshot().bridge_gateway.clone();
        if gateway.is_empty() {
            return Err(OrchestratorError::Config(
                "bridge_gateway is not configured".to_string(),
            ));
        }

        let source = ChainId::Finance;
        let destination = source.counterpart();
        let draft = NewTransaction {
            operation: OperationKind::Bridge,
            source_chain: source,
            destination_chain: destination,
            amount,
            currency: self.policy.default_currency.clone(),
            initiator: None,
        };
        let call = ChainCall::BridgeTransfer {
            amount,
            recipient: recipient.to_string(),
            destination,
            gateway,
        };

        self.dispatch(draft, source, call).await
    }

    /// Look up a single record
    pub async fn transaction(&self, tx_id: &TransactionId) -> OrchestratorResult<CrossChainTransaction> {
        self.ledger
            .get(tx_id)
            .await
            .ok_or_else(|| OrchestratorError::TransactionNotFound {
                tx_id: tx_id.clone(),
            })
    }

    /// Transaction history, newest first
    pub async fn transactions(&self) -> Vec<CrossChainTransaction> {
        self.ledger.history().await
    }

    pub async fn stats(&self) -> TransactionStats {
        self.ledger.stats().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.ledger.subscribe()
    }

    /// Record, submit and settle a single chain call.
    ///
    /// The call runs on its own task so that a caller which stops awaiting does
    /// not leave the record pending.
    async fn dispatch(
        &self,
        draft: NewTransaction,
        target: ChainId,
        call: ChainCall,
    ) -> OrchestratorResult<CrossChainTransaction> {
        let client = self.chain_manager.client(target)?;
        let operation = draft.operation;

        let record = self.ledger.record_pending(draft).await;
        crate::metrics::record_tx_dispatched(operation);
        info!(
            "Dispatching {} {} on {} chain",
            operation, record.id, target
        );

        let ledger = self.ledger.clone();
        let tx_id = record.id.clone();
        let task = tokio::spawn(settle(ledger, client, tx_id.clone(), target, operation, call));

        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                error!("Dispatch task for {} aborted: {}", tx_id, join_error);
                if let Err(e) = self
                    .ledger
                    .mark_failed(&tx_id, "dispatch task aborted".to_string())
                    .await
                {
                    warn!("Could not settle {}: {}", tx_id, e);
                }
                Err(OrchestratorError::Internal(format!(
                    "dispatch of {} aborted",
                    tx_id
                )))
            }
        }
    }
}

async fn settle(
    ledger: Arc<TransactionLedger>,
    client: Arc<dyn ChainClient>,
    tx_id: TransactionId,
    chain: ChainId,
    operation: OperationKind,
    call: ChainCall,
) -> OrchestratorResult<CrossChainTransaction> {
    let started = Instant::now();

    match client.submit(call).await {
        Ok(reference) => {
            let record = ledger.mark_completed(&tx_id, reference).await?;
            crate::metrics::record_tx_completed(operation, started.elapsed().as_secs_f64());
            info!("Transaction {} completed", tx_id);
            Ok(record)
        }
        Err(source) => {
            ledger.mark_failed(&tx_id, source.to_string()).await?;
            crate::metrics::record_tx_failed(operation);
            warn!("Transaction {} failed on {} chain: {}", tx_id, chain, source);
            Err(OrchestratorError::ChainOperation {
                chain,
                tx_id: Some(tx_id),
                source,
            })
        }
    }
}

fn validate_amount(amount: f64) -> OrchestratorResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(OrchestratorError::Validation(format!(
            "amount must be a positive number, got {}",
            amount
        )))
    }
}
