//! Configuration management for the yield relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::ProviderKind;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub orchestrator: OrchestratorConfig,
    pub chains: ChainsConfig,
    pub wallet: WalletConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

/// Endpoint identifiers for both ledgers, the bridge relay and the price oracle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainConfig {
    pub custody_canister_id: String,
    pub finance_contract_address: String,
    pub bridge_gateway: String,
    pub price_oracle: String,
}

/// Partial update of [`CrossChainConfig`]; only supplied keys change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainConfigUpdate {
    pub custody_canister_id: Option<String>,
    pub finance_contract_address: Option<String>,
    pub bridge_gateway: Option<String>,
    pub price_oracle: Option<String>,
}

impl CrossChainConfig {
    /// Merge a partial update into a new config
    pub fn merged(&self, update: CrossChainConfigUpdate) -> Self {
        Self {
            custody_canister_id: update
                .custody_canister_id
                .unwrap_or_else(|| self.custody_canister_id.clone()),
            finance_contract_address: update
                .finance_contract_address
                .unwrap_or_else(|| self.finance_contract_address.clone()),
            bridge_gateway: update
                .bridge_gateway
                .unwrap_or_else(|| self.bridge_gateway.clone()),
            price_oracle: update
                .price_oracle
                .unwrap_or_else(|| self.price_oracle.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(flatten)]
    pub endpoints: CrossChainConfig,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_supported_currencies")]
    pub supported_currencies: Vec<String>,
    #[serde(default)]
    pub min_deposit: Option<f64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoints: CrossChainConfig::default(),
            default_currency: default_currency(),
            supported_currencies: default_supported_currencies(),
            min_deposit: None,
        }
    }
}

fn default_currency() -> String {
    "USDC".to_string()
}

fn default_supported_currencies() -> Vec<String> {
    vec!["USDC".to_string(), "USDT".to_string(), "DAI".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    pub custody: ChainConfig,
    pub finance: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub selection_path: PathBuf,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEndpoint>,
}

impl WalletConfig {
    /// Provider endpoints keyed by parsed provider kind
    pub fn provider_endpoints(&self) -> OrchestratorResult<Vec<(ProviderKind, &ProviderEndpoint)>> {
        self.providers
            .iter()
            .map(|(name, endpoint)| {
                name.parse::<ProviderKind>()
                    .map(|kind| (kind, endpoint))
                    .map_err(OrchestratorError::Config)
            })
            .collect()
    }
}

/// Where the wallet bridge for one provider kind listens
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoint {
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> OrchestratorResult<Self> {
        let config_path = env::var("YIELD_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
            OrchestratorError::Config(format!(
                "Failed to read config file {:?}: {}",
                config_path, e
            ))
        })?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(input: &str) -> OrchestratorResult<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings = toml::from_str(&config_str).map_err(|e| {
            OrchestratorError::Config(format!("Failed to parse configuration: {}", e))
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> OrchestratorResult<()> {
        for (name, chain) in [("custody", &self.chains.custody), ("finance", &self.chains.finance)] {
            if chain.rpc_urls.is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "Chain {} has no RPC URLs configured",
                    name
                )));
            }
        }

        let orchestrator = &self.orchestrator;
        if !orchestrator
            .supported_currencies
            .contains(&orchestrator.default_currency)
        {
            return Err(OrchestratorError::Config(format!(
                "Default currency {} is not in supported_currencies",
                orchestrator.default_currency
            )));
        }

        if let Some(min) = orchestrator.min_deposit {
            if !(min.is_finite() && min > 0.0) {
                return Err(OrchestratorError::Config(format!(
                    "min_deposit must be positive, got {}",
                    min
                )));
            }
        }

        if orchestrator.endpoints.bridge_gateway.is_empty() {
            tracing::warn!("No bridge gateway configured - bridge operations will be rejected by the finance chain");
        }

        if self.wallet.provider_endpoints()?.is_empty() {
            tracing::warn!("No wallet providers configured");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [orchestrator]
        custody_canister_id = "icp_yield_vault"
        finance_contract_address = "inj1vault"
        bridge_gateway = "axelar-gateway"
        price_oracle = "oracle"
        min_deposit = 100.0

        [chains.custody]
        rpc_urls = ["http://127.0.0.1:4943"]

        [chains.finance]
        rpc_urls = ["http://127.0.0.1:26657", "http://127.0.0.1:26658"]
        request_timeout_ms = 5000

        [wallet]
        selection_path = "/tmp/yield-relayer/wallet.json"

        [wallet.providers.keplr]
        endpoint = "http://127.0.0.1:9100"

        [wallet.providers.internet_identity]
        endpoint = "http://127.0.0.1:9200"

        [api]
        host = "127.0.0.1"
        port = 8080

        [metrics]
        enabled = false
        port = 9090
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("YIELD_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${YIELD_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_parse_sample_settings() {
        let settings = Settings::from_toml(SAMPLE).unwrap();

        assert_eq!(settings.orchestrator.endpoints.custody_canister_id, "icp_yield_vault");
        assert_eq!(settings.orchestrator.default_currency, "USDC");
        assert_eq!(settings.orchestrator.min_deposit, Some(100.0));
        assert_eq!(settings.chains.custody.request_timeout_ms, 30_000);
        assert_eq!(settings.chains.finance.rpc_urls.len(), 2);

        let mut kinds: Vec<ProviderKind> = settings
            .wallet
            .provider_endpoints()
            .unwrap()
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        kinds.sort();
        assert_eq!(kinds, vec![ProviderKind::InternetIdentity, ProviderKind::Keplr]);
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let input = SAMPLE.replace("[wallet.providers.keplr]", "[wallet.providers.phantom]");
        let err = Settings::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("phantom"));
    }

    #[test]
    fn test_rejects_chain_without_rpc_urls() {
        let input = SAMPLE.replace(r#"rpc_urls = ["http://127.0.0.1:4943"]"#, "rpc_urls = []");
        let err = Settings::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("custody"));
    }

    #[test]
    fn test_rejects_non_positive_min_deposit() {
        let input = SAMPLE.replace("min_deposit = 100.0", "min_deposit = 0.0");
        assert!(Settings::from_toml(&input).is_err());
    }

    #[test]
    fn test_partial_update_only_changes_supplied_keys() {
        let config = CrossChainConfig {
            custody_canister_id: "icp_yield_vault".to_string(),
            finance_contract_address: "inj1vault".to_string(),
            bridge_gateway: "axelar".to_string(),
            price_oracle: "oracle-a".to_string(),
        };

        let merged = config.merged(CrossChainConfigUpdate {
            price_oracle: Some("oracle-b".to_string()),
            ..Default::default()
        });

        assert_eq!(merged.price_oracle, "oracle-b");
        assert_eq!(merged.custody_canister_id, config.custody_canister_id);
        assert_eq!(merged.finance_contract_address, config.finance_contract_address);
        assert_eq!(merged.bridge_gateway, config.bridge_gateway);
    }
}
