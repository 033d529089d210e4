//! Yield Relayer - orchestrates stablecoin yield between a custody chain and a
//! finance chain, and exposes wallet and operation endpoints over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use yield_relayer::api::{self, AppState};
use yield_relayer::chain::{ChainClient, ChainId, ChainManager, RpcChainClient};
use yield_relayer::config::{Settings, WalletConfig};
use yield_relayer::coordination::CrossChainOrchestrator;
use yield_relayer::metrics::MetricsServer;
use yield_relayer::state::FileSelectionStore;
use yield_relayer::wallet::{
    HttpIdentityProvider, HttpWalletAdapter, ProviderKind, WalletBackend,
    WalletConnectionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Yield Relayer v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("loading configuration")?;

    let custody = RpcChainClient::new(ChainId::Custody, &settings.chains.custody)
        .context("building custody chain client")?;
    let finance = RpcChainClient::new(ChainId::Finance, &settings.chains.finance)
        .context("building finance chain client")?;
    let chain_manager = Arc::new(ChainManager::new(vec![
        Arc::new(custody) as Arc<dyn ChainClient>,
        Arc::new(finance) as Arc<dyn ChainClient>,
    ])?);

    let orchestrator = Arc::new(CrossChainOrchestrator::new(
        chain_manager.clone(),
        settings.orchestrator.clone(),
    ));

    // The API still serves health and wallet routes while the chains are down
    if let Err(e) = orchestrator.initialize().await {
        error!("Orchestrator initialization failed: {}", e);
    }

    let wallets = Arc::new(build_wallets(&settings.wallet)?);
    match wallets.restore_session().await {
        Some(identity) => info!("Restored {} session for {}", identity.provider, identity.account),
        None => info!("No wallet session restored"),
    }

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            orchestrator: orchestrator.clone(),
            wallets: wallets.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Retry initialization in the background until both chains answer
    let init_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            while !orchestrator.is_initialized() {
                tokio::time::sleep(tokio::time::Duration::from_secs(15)).await;
                if let Err(e) = orchestrator.initialize().await {
                    warn!("Initialization retry failed: {}", e);
                }
            }
        }
    });

    info!("Yield Relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    init_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Yield Relayer stopped");
    Ok(())
}

fn build_wallets(config: &WalletConfig) -> Result<WalletConnectionManager> {
    let store = Arc::new(FileSelectionStore::new(config.selection_path.clone()));
    let mut wallets = WalletConnectionManager::new(store);

    for (kind, provider) in config.provider_endpoints()? {
        let backend = match kind {
            ProviderKind::InternetIdentity => {
                WalletBackend::Identity(Arc::new(HttpIdentityProvider::new(&provider.endpoint)))
            }
            _ => WalletBackend::Adapter(Arc::new(HttpWalletAdapter::new(&provider.endpoint))),
        };
        info!("Registered {} wallet backend at {}", kind, provider.endpoint);
        wallets = wallets.with_backend(kind, backend);
    }

    Ok(wallets)
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,yield_relayer=debug,hyper=warn,reqwest=warn")
    });

    let json = std::env::var("YIELD_RELAYER_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
