//! Wallet connection manager - the connection state machine
//!
//! Multiplexes provider backends behind one identity, persists the last
//! selection and reacts to provider notifications.

use super::backend::{WalletBackend, WalletError};
use super::types::{
    ChainClassification, ConnectionState, ConnectionStatus, FailurePolicy, ProviderKind,
    ProviderNotification, WalletIdentity,
};
use crate::chain::ChainId;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::SelectionStore;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Session {
    identity: Option<WalletIdentity>,
}

/// Tracks the single active wallet identity
pub struct WalletConnectionManager {
    backends: HashMap<ProviderKind, WalletBackend>,
    store: Arc<dyn SelectionStore>,
    session: Mutex<Session>,
    /// Bumped by every connect/disconnect; stale attempts compare against it
    generation: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

impl WalletConnectionManager {
    pub fn new(store: Arc<dyn SelectionStore>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            backends: HashMap::new(),
            store,
            session: Mutex::new(Session::default()),
            generation: AtomicU64::new(0),
            state_tx,
        }
    }

    /// Register the backend serving `kind`
    pub fn with_backend(mut self, kind: ProviderKind, backend: WalletBackend) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn registered_providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The active identity, if connected
    pub async fn identity(&self) -> Option<WalletIdentity> {
        self.session.lock().await.identity.clone()
    }

    /// Ecosystem of the active identity, for UI gating
    pub fn classification(&self) -> ChainClassification {
        match self.state() {
            ConnectionState::Connected(kind) => match kind.ecosystem() {
                ChainId::Custody => ChainClassification::CustodyChain,
                ChainId::Finance => ChainClassification::FinanceChain,
            },
            _ => ChainClassification::None,
        }
    }

    /// Connect through `kind`, replacing any prior identity
    pub async fn connect(&self, kind: ProviderKind) -> OrchestratorResult<WalletIdentity> {
        let backend = self
            .backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| OrchestratorError::Connection {
                provider: kind,
                message: "provider not registered".to_string(),
            })?;

        let attempt = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = {
            let mut session = self.session.lock().await;
            let previous = session.identity.take();
            self.state_tx.send_replace(ConnectionState::Connecting(kind));
            previous
        };

        if let Some(prev) = previous.filter(|p| p.provider != kind) {
            self.release(prev.provider).await;
        }

        info!("Connecting wallet via {}", kind);
        let resolved = backend.resolve(kind).await;

        let mut session = self.session.lock().await;
        if self.generation.load(Ordering::SeqCst) != attempt {
            debug!("Connection attempt via {} superseded", kind);
            return Err(OrchestratorError::Connection {
                provider: kind,
                message: "superseded by a newer connection request".to_string(),
            });
        }

        match resolved {
            Ok(account) => {
                let identity = WalletIdentity {
                    provider: kind,
                    account,
                    status: ConnectionStatus::Connected,
                    connected_at: Utc::now(),
                };
                session.identity = Some(identity.clone());
                self.state_tx.send_replace(ConnectionState::Connected(kind));
                drop(session);

                if let Err(e) = self.store.save(kind).await {
                    warn!("Connected via {} but failed to persist selection: {}", kind, e);
                }

                crate::metrics::record_wallet_connection(kind, true);
                info!("Wallet connected via {}: {}", kind, identity.account);
                Ok(identity)
            }
            Err(e) => {
                session.identity = None;
                self.state_tx.send_replace(ConnectionState::Disconnected);
                drop(session);

                crate::metrics::record_wallet_connection(kind, false);
                warn!("Wallet connection via {} failed: {}", kind, e);
                Err(connection_error(kind, e))
            }
        }
    }

    /// Connect under an explicit failure policy
    pub async fn connect_with_policy(
        &self,
        kind: ProviderKind,
        policy: FailurePolicy,
    ) -> OrchestratorResult<Option<WalletIdentity>> {
        match (self.connect(kind).await, policy) {
            (Ok(identity), _) => Ok(Some(identity)),
            (Err(e), FailurePolicy::BestEffort) => {
                debug!("Best-effort connection via {} swallowed: {}", kind, e);
                Ok(None)
            }
            (Err(e), FailurePolicy::Report) => Err(e),
        }
    }

    /// Drop the active identity and the persisted selection. Idempotent.
    pub async fn disconnect(&self) -> OrchestratorResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let provider = {
            let mut session = self.session.lock().await;
            let provider = self.state().provider();
            session.identity = None;
            self.state_tx.send_replace(ConnectionState::Disconnected);
            provider
        };

        if let Some(kind) = provider {
            self.release(kind).await;
            info!("Wallet {} disconnected", kind);
        }

        // The backend is released even when the slot cannot be cleared
        self.store.clear().await
    }

    /// Reconnect the persisted provider, if any. Failures never reach the caller.
    pub async fn restore_session(&self) -> Option<WalletIdentity> {
        let kind = match self.store.load().await {
            Ok(Some(kind)) => kind,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read persisted wallet selection: {}", e);
                return None;
            }
        };

        info!("Restoring wallet session via {}", kind);
        self.connect_with_policy(kind, FailurePolicy::BestEffort)
            .await
            .ok()
            .flatten()
    }

    /// React to a provider-originated notification
    pub async fn handle_notification(&self, notification: ProviderNotification) {
        match notification {
            ProviderNotification::KeystoreChanged { provider } => {
                if self.state() != ConnectionState::Connected(provider) {
                    debug!("Ignoring keystore change from inactive provider {}", provider);
                    return;
                }

                info!("Keystore changed for {}, reconnecting", provider);
                // BestEffort never yields Err
                let _ = self
                    .connect_with_policy(provider, FailurePolicy::BestEffort)
                    .await;
            }
        }
    }

    async fn release(&self, kind: ProviderKind) {
        if let Some(backend) = self.backends.get(&kind) {
            if let Err(e) = backend.release().await {
                warn!("Provider {} failed to release its session: {}", kind, e);
            }
        }
    }
}

fn connection_error(provider: ProviderKind, error: WalletError) -> OrchestratorError {
    OrchestratorError::Connection {
        provider,
        message: error.to_string(),
    }
}
