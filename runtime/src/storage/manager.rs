use std::sync::Arc;

use tracing::debug;

use super::{KvStorage, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoragesStatus {
    #[default]
    Created,
    Initialized,
    Finalized,
}

/// Sequentially initializes and finalizes the registered namespaces.
pub struct StorageManager {
    status: StoragesStatus,
    storages: Vec<Arc<dyn KvStorage>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self {
            status: StoragesStatus::Created,
            storages: Vec::new(),
        }
    }

    pub fn register_all<I>(&mut self, storages: I)
    where
        I: IntoIterator<Item = Arc<dyn KvStorage>>,
    {
        self.storages.extend(storages);
    }

    pub async fn initialize_all(&mut self) -> StorageResult<()> {
        if self.status == StoragesStatus::Initialized {
            return Ok(());
        }

        for storage in &self.storages {
            storage.initialize().await?;
        }

        debug!(count = self.storages.len(), "storages initialized");
        self.status = StoragesStatus::Initialized;
        Ok(())
    }

    pub async fn finalize_all(&mut self) -> StorageResult<()> {
        if self.status != StoragesStatus::Initialized {
            return Ok(());
        }

        for storage in &self.storages {
            storage.finalize().await?;
        }
        self.status = StoragesStatus::Finalized;
        Ok(())
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}
