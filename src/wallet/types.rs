//! Wallet identity and connection state types

use crate::chain::ChainId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported wallet providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Principal-based identity flow for the custody chain (no provider strategy)
    InternetIdentity,
    /// Cosmos ecosystem
    Keplr,
    /// Cosmos ecosystem
    Leap,
    /// Ethereum ecosystem
    Metamask,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::InternetIdentity,
        ProviderKind::Keplr,
        ProviderKind::Leap,
        ProviderKind::Metamask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::InternetIdentity => "internet_identity",
            ProviderKind::Keplr => "keplr",
            ProviderKind::Leap => "leap",
            ProviderKind::Metamask => "metamask",
        }
    }

    /// Chain whose accounts this provider yields
    pub fn ecosystem(&self) -> ChainId {
        match self {
            ProviderKind::InternetIdentity => ChainId::Custody,
            ProviderKind::Keplr | ProviderKind::Leap | ProviderKind::Metamask => ChainId::Finance,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown wallet provider: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state machine
///
/// `Disconnected -> Connecting(p) -> Connected(p)`, with `Connecting` able to fall
/// back to `Disconnected` without reaching `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "provider", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting(ProviderKind),
    Connected(ProviderKind),
}

impl ConnectionState {
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting(kind) | ConnectionState::Connected(kind) => Some(*kind),
        }
    }
}

/// The active signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub provider: ProviderKind,
    /// Address or principal reported by the provider
    pub account: String,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
}

impl WalletIdentity {
    pub fn chain(&self) -> ChainId {
        self.provider.ecosystem()
    }
}

/// Which ecosystem the active identity belongs to.
///
/// For UI gating only; authorization is always left to the chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainClassification {
    None,
    CustodyChain,
    FinanceChain,
}

/// Notifications originated by a provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProviderNotification {
    KeystoreChanged { provider: ProviderKind },
}

/// What a call site does with a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and swallow; the caller only observes the resulting state
    BestEffort,
    /// Return the error to the caller
    Report,
}
