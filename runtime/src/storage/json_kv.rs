use std::{
    collections::HashMap,
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::io::{ensure_parent_dir, load_json, write_json_file};
use super::{KvStorage, StorageResult};

#[derive(Clone, Debug)]
pub struct JsonKvStorageConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
    pub workspace: Option<String>,
}

/// On-disk envelope around a record. `seq` is assigned on first insert and
/// kept across updates, so it orders records by creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    record: Value,
}

/// In-memory namespace mirrored to `kv_store_<namespace>.json`.
///
/// Writes only touch memory and mark the namespace dirty; `sync_if_dirty`
/// flushes a snapshot atomically. Flushes of one namespace are serialized
/// on `flush_lock`, so snapshots reach disk in the order they were taken.
pub struct JsonKvStorage {
    label: String,
    file_path: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
    flush_lock: Mutex<()>,
    dirty: AtomicBool,
    next_seq: AtomicU64,
}

impl JsonKvStorage {
    pub fn new(config: JsonKvStorageConfig) -> Self {
        let dir = match config.workspace.as_deref() {
            Some(ws) if !ws.is_empty() => config.working_dir.join(ws),
            _ => config.working_dir.clone(),
        };
        let label = match config.workspace.as_deref() {
            Some(ws) if !ws.is_empty() => format!("{ws}/{}", config.namespace),
            _ => config.namespace.clone(),
        };

        Self {
            file_path: dir.join(format!("kv_store_{}.json", config.namespace)),
            label,
            entries: RwLock::new(HashMap::new()),
            flush_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl KvStorage for JsonKvStorage {
    async fn initialize(&self) -> StorageResult<()> {
        ensure_parent_dir(&self.file_path).await?;
        let entries: HashMap<String, Entry> = load_json(&self.file_path)
            .await
            .with_context(|| format!("failed to load kv store {}", self.label))?;

        let last_seq = entries.values().map(|entry| entry.seq).max().unwrap_or(0);
        *self.entries.write().await = entries;
        self.next_seq.store(last_seq + 1, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize(&self) -> StorageResult<()> {
        self.sync_if_dirty().await
    }

    async fn upsert(&self, records: HashMap<String, Value>) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        for (key, record) in records {
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.record = record;
                    entry.updated_at = now;
                }
                None => {
                    let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                    entries.insert(
                        key,
                        Entry {
                            seq,
                            created_at: now,
                            updated_at: now,
                            record,
                        },
                    );
                }
            }
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        for id in ids {
            entries.remove(id);
        }
        if entries.len() != before {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn scan(&self) -> StorageResult<Vec<(String, Value)>> {
        let entries = self.entries.read().await;
        let mut rows: Vec<(&String, &Entry)> = entries.iter().collect();
        rows.sort_by_key(|(_, entry)| entry.seq);
        Ok(rows
            .into_iter()
            .map(|(key, entry)| (key.clone(), entry.record.clone()))
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(id).map(|entry| entry.record.clone()))
    }

    async fn get_by_ids(&self, ids: &[String]) -> StorageResult<Vec<Option<Value>>> {
        let entries = self.entries.read().await;
        Ok(ids
            .iter()
            .map(|id| entries.get(id).map(|entry| entry.record.clone()))
            .collect())
    }

    async fn sync_if_dirty(&self) -> StorageResult<()> {
        let _flush = self.flush_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = self.entries.read().await.clone();
        if let Err(err) = write_json_file(&self.file_path, &snapshot).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err).with_context(|| format!("failed to write kv store {}", self.label));
        }
        Ok(())
    }
}
