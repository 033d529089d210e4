//! HTTP API for the presentation layer: wallet, balances and yield operations

use crate::balance::{AggregatedBalance, BalanceAggregator};
use crate::chain::ChainId;
use crate::config::{ApiConfig, CrossChainConfig, CrossChainConfigUpdate};
use crate::coordination::{
    CrossChainOrchestrator, CrossChainTransaction, TransactionId, TransactionStats,
};
use crate::error::{ErrorKind, OrchestratorError, OrchestratorResult};
use crate::wallet::{
    ChainClassification, ConnectionState, ProviderKind, ProviderNotification,
    WalletConnectionManager, WalletIdentity,
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CrossChainOrchestrator>,
    pub wallets: Arc<WalletConnectionManager>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/config", get(get_config).patch(update_config))
        .route("/wallet", get(get_wallet))
        .route("/wallet/connect", post(connect_wallet))
        .route("/wallet/disconnect", post(disconnect_wallet))
        .route("/wallet/notifications", post(wallet_notification))
        .route("/balances", get(get_balances))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
        .route("/stats", get(get_stats))
        .route("/deposit", post(deposit))
        .route("/skim", post(skim))
        .route("/convert", post(convert))
        .route("/bridge", post(bridge))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> OrchestratorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OrchestratorError::Config(format!("cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| OrchestratorError::Internal(format!("api server: {}", e)))?;

    Ok(())
}

/// Orchestrator errors rendered as `{kind, message, transaction_id?}`
pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Connection | ErrorKind::ChainOperation => StatusCode::BAD_GATEWAY,
            ErrorKind::Config | ErrorKind::Storage | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if self.0.should_alert() {
            warn!("Request failed: {}", self.0);
        }

        let body = ErrorResponse {
            kind,
            message: self.0.to_string(),
            transaction_id: self.0.transaction_id().cloned(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness - initialized and both chains reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let initialized = state.orchestrator.is_initialized();
    let chains: Vec<ChainHealth> = state
        .orchestrator
        .health_check()
        .await
        .into_iter()
        .map(|(chain, healthy)| ChainHealth { chain, healthy })
        .collect();

    let ready = initialized && chains.iter().all(|c| c.healthy);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            initialized,
            chains,
        }),
    )
}

async fn get_config(State(state): State<AppState>) -> Json<CrossChainConfig> {
    Json(state.orchestrator.config())
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<CrossChainConfigUpdate>,
) -> Json<CrossChainConfig> {
    Json(state.orchestrator.update_config(update))
}

async fn get_wallet(State(state): State<AppState>) -> Json<WalletResponse> {
    Json(WalletResponse {
        state: state.wallets.state(),
        identity: state.wallets.identity().await,
        classification: state.wallets.classification(),
        providers: state.wallets.registered_providers(),
    })
}

async fn connect_wallet(
    State(state): State<AppState>,
    Json(req): Json<ProviderRequest>,
) -> ApiResult<WalletIdentity> {
    Ok(Json(state.wallets.connect(req.provider).await?))
}

async fn disconnect_wallet(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.wallets.disconnect().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn wallet_notification(
    State(state): State<AppState>,
    Json(req): Json<ProviderRequest>,
) -> StatusCode {
    state
        .wallets
        .handle_notification(ProviderNotification::KeystoreChanged {
            provider: req.provider,
        })
        .await;
    StatusCode::ACCEPTED
}

/// Aggregated balances for the active identity
async fn get_balances(State(state): State<AppState>) -> ApiResult<AggregatedBalance> {
    let identity = active_identity(&state).await?;
    let balances = state.orchestrator.get_balances(&[identity]).await?;
    Ok(Json(BalanceAggregator::aggregate(&balances)))
}

async fn list_transactions(State(state): State<AppState>) -> Json<Vec<CrossChainTransaction>> {
    Json(state.orchestrator.transactions().await)
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CrossChainTransaction> {
    let tx_id = TransactionId::from(id);
    Ok(Json(state.orchestrator.transaction(&tx_id).await?))
}

async fn get_stats(State(state): State<AppState>) -> Json<TransactionStats> {
    Json(state.orchestrator.stats().await)
}

async fn deposit(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<CrossChainTransaction> {
    let tx = match req.currency {
        Some(currency) => {
            state
                .orchestrator
                .deposit_currency(req.chain, req.amount, &currency)
                .await?
        }
        None => state.orchestrator.deposit(req.chain, req.amount).await?,
    };
    Ok(Json(tx))
}

async fn skim(State(state): State<AppState>) -> ApiResult<CrossChainTransaction> {
    Ok(Json(state.orchestrator.trigger_yield_skim().await?))
}

async fn convert(
    State(state): State<AppState>,
    Json(req): Json<ConvertRequest>,
) -> ApiResult<CrossChainTransaction> {
    let identity = active_identity(&state).await?;
    Ok(Json(
        state
            .orchestrator
            .convert_yield_to_bitcoin(&identity, req.amount)
            .await?,
    ))
}

async fn bridge(
    State(state): State<AppState>,
    Json(req): Json<BridgeRequest>,
) -> ApiResult<CrossChainTransaction> {
    Ok(Json(
        state
            .orchestrator
            .bridge_yield_to_other_chain(req.amount, &req.recipient)
            .await?,
    ))
}

async fn active_identity(state: &AppState) -> Result<WalletIdentity, ApiError> {
    state.wallets.identity().await.ok_or_else(|| {
        ApiError(OrchestratorError::Validation(
            "no wallet connected".to_string(),
        ))
    })
}

// Request types

#[derive(Deserialize)]
struct ProviderRequest {
    provider: ProviderKind,
}

#[derive(Deserialize)]
struct DepositRequest {
    chain: ChainId,
    amount: f64,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct ConvertRequest {
    amount: f64,
}

#[derive(Deserialize)]
struct BridgeRequest {
    amount: f64,
    recipient: String,
}

// Response types

#[derive(Serialize)]
struct ErrorResponse {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<TransactionId>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    initialized: bool,
    chains: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain: ChainId,
    healthy: bool,
}

#[derive(Serialize)]
struct WalletResponse {
    state: ConnectionState,
    identity: Option<WalletIdentity>,
    classification: ChainClassification,
    providers: Vec<ProviderKind>,
}
