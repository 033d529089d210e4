//! Coordination of yield operations across the two chains
//!
//! The orchestrator:
//! 1. Gates every operation behind a one-time initialization
//! 2. Validates parameters before anything is recorded
//! 3. Records each dispatched operation in the transaction ledger
//! 4. Settles records as completed or failed from the chain's answer

pub mod engine;
pub mod ledger;
pub mod transaction;

pub use engine::CrossChainOrchestrator;
pub use ledger::{TransactionLedger, TransactionStats};
pub use transaction::{
    CrossChainTransaction, NewTransaction, OperationKind, TransactionId, TransactionStatus,
};
