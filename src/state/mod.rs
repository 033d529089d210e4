//! Client-local persisted state
//!
//! Holds the single overwritable slot recording the last selected wallet
//! provider, so a session can be restored on startup.

mod selection;

pub use selection::{FileSelectionStore, MemorySelectionStore, SelectionStore};

#[cfg(test)]
pub use selection::MockSelectionStore;
