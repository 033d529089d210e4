//! Error types for the yield relayer

use crate::chain::{ChainError, ChainId};
use crate::coordination::TransactionId;
use crate::wallet::ProviderKind;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection to {provider} failed: {message}")]
    Connection {
        provider: ProviderKind,
        message: String,
    },

    #[error("Orchestrator not initialized")]
    NotInitialized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Chain operation failed on {chain}: {source}")]
    ChainOperation {
        chain: ChainId,
        tx_id: Option<TransactionId>,
        #[source]
        source: ChainError,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction {tx_id} not found")]
    TransactionNotFound { tx_id: TransactionId },

    #[error("Invalid state transition for {tx_id} from {from} to {to}")]
    InvalidStateTransition {
        tx_id: TransactionId,
        from: String,
        to: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification handed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Connection,
    NotInitialized,
    Validation,
    ChainOperation,
    Storage,
    NotFound,
    Internal,
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Config(_) => ErrorKind::Config,
            OrchestratorError::Connection { .. } => ErrorKind::Connection,
            OrchestratorError::NotInitialized => ErrorKind::NotInitialized,
            OrchestratorError::Validation(_) => ErrorKind::Validation,
            OrchestratorError::ChainOperation { .. } => ErrorKind::ChainOperation,
            OrchestratorError::Storage(_) => ErrorKind::Storage,
            OrchestratorError::TransactionNotFound { .. } => ErrorKind::NotFound,
            OrchestratorError::InvalidStateTransition { .. }
            | OrchestratorError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transaction recorded for this failure, if the operation got that far
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            OrchestratorError::ChainOperation { tx_id, .. } => tx_id.as_ref(),
            OrchestratorError::TransactionNotFound { tx_id }
            | OrchestratorError::InvalidStateTransition { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// Underlying chain error, if any
    pub fn chain_error(&self) -> Option<&ChainError> {
        match self {
            OrchestratorError::ChainOperation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidStateTransition { .. }
                | OrchestratorError::Storage(_)
                | OrchestratorError::Internal(_)
        )
    }
}

/// Result type for relayer operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
