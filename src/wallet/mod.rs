//! Wallet connections across provider ecosystems
//!
//! Handles:
//! - Provider backends (strategy wallets and the principal identity flow)
//! - The connection state machine and the single active identity
//! - Restoring the last selected provider on startup
//! - Keystore-change notifications

mod backend;
mod manager;
mod types;

pub use backend::{
    HttpIdentityProvider, HttpWalletAdapter, IdentityProvider, WalletAdapter, WalletBackend,
    WalletError, WalletResult,
};
pub use manager::WalletConnectionManager;
pub use types::{
    ChainClassification, ConnectionState, ConnectionStatus, FailurePolicy, ProviderKind,
    ProviderNotification, WalletIdentity,
};

#[cfg(test)]
pub use backend::{MockIdentityProvider, MockWalletAdapter};
