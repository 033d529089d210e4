//! Last-selected provider slot

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::ProviderKind;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One overwritable slot holding the last selected provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn load(&self) -> OrchestratorResult<Option<ProviderKind>>;
    async fn save(&self, provider: ProviderKind) -> OrchestratorResult<()>;
    async fn clear(&self) -> OrchestratorResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSelection {
    provider: String,
    saved_at: DateTime<Utc>,
}

/// JSON file backed slot
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SelectionStore for FileSelectionStore {
    async fn load(&self) -> OrchestratorResult<Option<ProviderKind>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OrchestratorError::Storage(format!(
                    "Failed to read {:?}: {}",
                    self.path, e
                )))
            }
        };

        let stored: StoredSelection = serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::Storage(format!("Corrupt selection file {:?}: {}", self.path, e))
        })?;

        match stored.provider.parse::<ProviderKind>() {
            Ok(kind) => Ok(Some(kind)),
            Err(e) => {
                warn!("Ignoring persisted selection: {}", e);
                Ok(None)
            }
        }
    }

    async fn save(&self, provider: ProviderKind) -> OrchestratorResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestratorError::Storage(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let stored = StoredSelection {
            provider: provider.as_str().to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| OrchestratorError::Storage(e.to_string()))?;

        tokio::fs::write(&self.path, json).await.map_err(|e| {
            OrchestratorError::Storage(format!("Failed to write {:?}: {}", self.path, e))
        })?;

        debug!("Persisted wallet selection {}", provider);
        Ok(())
    }

    async fn clear(&self) -> OrchestratorResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestratorError::Storage(format!(
                "Failed to remove {:?}: {}",
                self.path, e
            ))),
        }
    }
}

/// In-process slot, for embedding without a filesystem
#[derive(Default)]
pub struct MemorySelectionStore {
    slot: Mutex<Option<ProviderKind>>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(provider: ProviderKind) -> Self {
        Self {
            slot: Mutex::new(Some(provider)),
        }
    }
}

#[async_trait]
impl SelectionStore for MemorySelectionStore {
    async fn load(&self) -> OrchestratorResult<Option<ProviderKind>> {
        Ok(*self.slot.lock().await)
    }

    async fn save(&self, provider: ProviderKind) -> OrchestratorResult<()> {
        *self.slot.lock().await = Some(provider);
        Ok(())
    }

    async fn clear(&self) -> OrchestratorResult<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_file_slot_is_overwritten() {
        let dir = tempdir().unwrap();
        let store = FileSelectionStore::new(dir.path().join("nested").join("wallet.json"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save(ProviderKind::Keplr).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(ProviderKind::Keplr));

        store.save(ProviderKind::InternetIdentity).await.unwrap();
        assert_eq!(
            store.load().await.unwrap(),
            Some(ProviderKind::InternetIdentity)
        );
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileSelectionStore::new(dir.path().join("wallet.json"));

        assert_ok!(store.save(ProviderKind::Leap).await);
        assert_ok!(store.clear().await);
        assert_ok!(store.clear().await);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        std::fs::write(&path, "not json").unwrap();

        let err = assert_err!(FileSelectionStore::new(&path).load().await);
        assert!(matches!(err, OrchestratorError::Storage(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        std::fs::write(
            &path,
            r#"{"provider":"phantom","saved_at":"2024-12-30T14:30:00Z"}"#,
        )
        .unwrap();

        assert_eq!(FileSelectionStore::new(&path).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_slot() {
        let store = MemorySelectionStore::with_selection(ProviderKind::Metamask);
        assert_eq!(store.load().await.unwrap(), Some(ProviderKind::Metamask));
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
