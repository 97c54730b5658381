use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

pub mod graph;
pub mod io;
pub mod json_kv;
pub mod manager;

pub use graph::{GraphStore, GraphStoreConfig};
pub use json_kv::{JsonKvStorage, JsonKvStorageConfig};
pub use manager::StorageManager;

pub type StorageResult<T> = Result<T>;

#[async_trait]
pub trait KvStorage: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    /// Inserts or replaces records; a replaced record keeps its creation slot.
    async fn upsert(&self, records: HashMap<String, serde_json::Value>) -> StorageResult<()>;

    async fn delete(&self, ids: &[String]) -> StorageResult<()>;

    /// Every record, oldest first.
    async fn scan(&self) -> StorageResult<Vec<(String, serde_json::Value)>>;
    async fn get_by_id(&self, id: &str) -> StorageResult<Option<serde_json::Value>>;
    async fn get_by_ids(&self, ids: &[String]) -> StorageResult<Vec<Option<serde_json::Value>>>;

    /// Flush dirty state to disk if needed.
    async fn sync_if_dirty(&self) -> StorageResult<()>;
}
