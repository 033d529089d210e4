//! Wallet provider backends
//!
//! Strategy-style wallets (Keplr, Leap, MetaMask) expose a capability interface;
//! the principal-based identity flow has its own trait. Both are dispatched through
//! the [`WalletBackend`] sum type.

use super::types::ProviderKind;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("provider returned no accounts")]
    NoAccounts,
}

pub type WalletResult<T> = Result<T, WalletError>;

/// Capability interface implemented per wallet ecosystem
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Make `kind` the active wallet inside this adapter
    async fn select_provider(&self, kind: ProviderKind) -> WalletResult<()>;

    /// Addresses exposed by the selected wallet, primary first
    async fn list_addresses(&self) -> WalletResult<Vec<String>>;

    /// Release the adapter's session
    async fn disconnect(&self) -> WalletResult<()>;
}

/// Principal-based identity flow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Ask the user to approve a connection, returning their principal
    async fn request_connection(&self) -> WalletResult<String>;

    /// Release the identity session
    async fn disconnect(&self) -> WalletResult<()>;
}

/// A registered provider backend
#[derive(Clone)]
pub enum WalletBackend {
    Adapter(Arc<dyn WalletAdapter>),
    Identity(Arc<dyn IdentityProvider>),
}

impl WalletBackend {
    /// Resolve the account (address or principal) for `kind`
    pub async fn resolve(&self, kind: ProviderKind) -> WalletResult<String> {
        match self {
            WalletBackend::Adapter(adapter) => {
                adapter.select_provider(kind).await?;
                adapter
                    .list_addresses()
                    .await?
                    .into_iter()
                    .find(|a| !a.is_empty())
                    .ok_or(WalletError::NoAccounts)
            }
            WalletBackend::Identity(identity) => {
                let principal = identity.request_connection().await?;
                if principal.is_empty() {
                    return Err(WalletError::NoAccounts);
                }
                Ok(principal)
            }
        }
    }

    /// Ask the backend to release its session
    pub async fn release(&self) -> WalletResult<()> {
        match self {
            WalletBackend::Adapter(adapter) => adapter.disconnect().await,
            WalletBackend::Identity(identity) => identity.disconnect().await,
        }
    }
}

fn classify(status: StatusCode, body: String) -> WalletError {
    if status.is_client_error() {
        WalletError::Rejected(body)
    } else {
        WalletError::Unreachable(format!("{}: {}", status, body))
    }
}

#[derive(Debug, Deserialize)]
struct AddressesResponse {
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    principal: String,
}

/// Adapter talking to a local wallet bridge daemon over HTTP
pub struct HttpWalletAdapter {
    client: Client,
    endpoint: String,
}

impl HttpWalletAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> WalletResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, text));
        }
        Ok(response)
    }
}

#[async_trait]
impl WalletAdapter for HttpWalletAdapter {
    async fn select_provider(&self, kind: ProviderKind) -> WalletResult<()> {
        debug!("Selecting wallet {} via {}", kind, self.endpoint);
        self.post("/select", json!({ "provider": kind })).await?;
        Ok(())
    }

    async fn list_addresses(&self) -> WalletResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/addresses", self.endpoint))
            .send()
            .await
            .map_err(|e| WalletError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, text));
        }

        let body: AddressesResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Unreachable(format!("malformed response: {}", e)))?;
        Ok(body.addresses)
    }

    async fn disconnect(&self) -> WalletResult<()> {
        self.post("/disconnect", json!({})).await?;
        Ok(())
    }
}

/// Identity provider talking to a local identity bridge over HTTP
pub struct HttpIdentityProvider {
    adapter: HttpWalletAdapter,
}

impl HttpIdentityProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            adapter: HttpWalletAdapter::new(endpoint),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn request_connection(&self) -> WalletResult<String> {
        let response = self.adapter.post("/connect", json!({})).await?;
        let body: ConnectResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Unreachable(format!("malformed response: {}", e)))?;
        Ok(body.principal)
    }

    async fn disconnect(&self) -> WalletResult<()> {
        self.adapter.post("/disconnect", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adapter_resolves_first_address() {
        let mut adapter = MockWalletAdapter::new();
        adapter
            .expect_select_provider()
            .withf(|kind| *kind == ProviderKind::Keplr)
            .times(1)
            .returning(|_| Ok(()));
        adapter
            .expect_list_addresses()
            .returning(|| Ok(vec!["inj1primary".to_string(), "inj1secondary".to_string()]));

        let backend = WalletBackend::Adapter(Arc::new(adapter));
        let account = backend.resolve(ProviderKind::Keplr).await.unwrap();
        assert_eq!(account, "inj1primary");
    }

    #[tokio::test]
    async fn test_adapter_without_addresses_is_rejected() {
        let mut adapter = MockWalletAdapter::new();
        adapter.expect_select_provider().returning(|_| Ok(()));
        adapter.expect_list_addresses().returning(|| Ok(vec![]));

        let backend = WalletBackend::Adapter(Arc::new(adapter));
        assert_eq!(
            backend.resolve(ProviderKind::Leap).await,
            Err(WalletError::NoAccounts)
        );
    }

    #[tokio::test]
    async fn test_identity_flow_returns_principal() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_request_connection()
            .returning(|| Ok("rdmx6-jaaaa-aaaaa-aaadq-cai".to_string()));

        let backend = WalletBackend::Identity(Arc::new(identity));
        let account = backend.resolve(ProviderKind::InternetIdentity).await.unwrap();
        assert_eq!(account, "rdmx6-jaaaa-aaaaa-aaadq-cai");
    }

    #[tokio::test]
    async fn test_unreachable_bridge() {
        let adapter = HttpWalletAdapter::new("http://127.0.0.1:1/");
        let err = adapter.select_provider(ProviderKind::Keplr).await.unwrap_err();
        assert!(matches!(err, WalletError::Unreachable(_)));
    }
}
