//! Yield Relayer - cross-chain yield orchestration
//!
//! Connects a user's wallet on either ecosystem, dispatches deposit, yield skim,
//! Bitcoin conversion and bridge operations across the custody and finance
//! chains, and tracks every dispatched operation as a transaction record.

pub mod api;
pub mod balance;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod state;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestratorError, OrchestratorResult};
