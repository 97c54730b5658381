use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use super::{JsonKvStorage, JsonKvStorageConfig, KvStorage, StorageResult};
use crate::pipeline::{
    types::{
        CandidatePair, Document, DocumentStatus, Edge, EvidenceRef, IdeaNode, Job, JobType,
    },
    utils::compute_mdhash_id,
};

#[derive(Clone, Debug)]
pub struct GraphStoreConfig {
    pub working_dir: PathBuf,
    pub workspace: Option<String>,
}

/// Typed access to the project graph records.
///
/// Each record kind lives in its own JSON namespace; "indexed" queries are
/// scans over that namespace ordered by insertion. Every mutation is
/// flushed before returning so persisted state survives a restart between
/// job steps.
pub struct GraphStore {
    documents: Arc<JsonKvStorage>,
    nodes: Arc<JsonKvStorage>,
    evidence_refs: Arc<JsonKvStorage>,
    edges: Arc<JsonKvStorage>,
    jobs: Arc<JsonKvStorage>,
    candidate_pairs: Arc<JsonKvStorage>,
}

impl GraphStore {
    pub fn new(config: GraphStoreConfig) -> Self {
        let namespace = |name: &str| {
            Arc::new(JsonKvStorage::new(JsonKvStorageConfig {
                working_dir: config.working_dir.clone(),
                namespace: name.into(),
                workspace: config.workspace.clone(),
            }))
        };

        Self {
            documents: namespace("documents"),
            nodes: namespace("nodes"),
            evidence_refs: namespace("evidence_refs"),
            edges: namespace("edges"),
            jobs: namespace("jobs"),
            candidate_pairs: namespace("candidate_pairs"),
        }
    }

    /// Opens every namespace; convenience for tests and tools.
    pub async fn open(config: GraphStoreConfig) -> StorageResult<Self> {
        let store = Self::new(config);
        for storage in store.storages() {
            storage.initialize().await?;
        }
        Ok(store)
    }

    pub fn storages(&self) -> Vec<Arc<dyn KvStorage>> {
        let storages: [Arc<dyn KvStorage>; 6] = [
            self.documents.clone(),
            self.nodes.clone(),
            self.evidence_refs.clone(),
            self.edges.clone(),
            self.jobs.clone(),
            self.candidate_pairs.clone(),
        ];
        storages.into()
    }

    // --- documents ---

    pub async fn put_document(&self, document: &Document) -> StorageResult<()> {
        put(&self.documents, &document.id, document).await
    }

    pub async fn get_document(&self, id: &str) -> StorageResult<Option<Document>> {
        fetch(&self.documents, id).await
    }

    pub async fn list_documents(&self, project_id: &str) -> StorageResult<Vec<Document>> {
        scan(&self.documents, |doc: &Document| doc.project_id == project_id).await
    }

    pub async fn set_document_status(&self, id: &str, status: DocumentStatus) -> StorageResult<()> {
        let mut document = self
            .get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document {id} not found"))?;
        document.status = status;
        self.put_document(&document).await
    }

    pub async fn set_document_summary(&self, id: &str, summary: &str) -> StorageResult<()> {
        let mut document = self
            .get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document {id} not found"))?;
        document.summary = Some(summary.to_string());
        self.put_document(&document).await
    }

    // --- idea nodes ---

    pub async fn insert_node(&self, node: &IdeaNode) -> StorageResult<()> {
        put(&self.nodes, &node.id, node).await
    }

    pub async fn get_node(&self, id: &str) -> StorageResult<Option<IdeaNode>> {
        fetch(&self.nodes, id).await
    }

    /// Project nodes in creation order.
    pub async fn list_nodes(&self, project_id: &str) -> StorageResult<Vec<IdeaNode>> {
        scan(&self.nodes, |node: &IdeaNode| node.project_id == project_id).await
    }

    pub async fn save_embeddings(&self, updates: &[(String, Vec<f32>)]) -> StorageResult<()> {
        let ids: Vec<String> = updates.iter().map(|(id, _)| id.clone()).collect();
        let existing = self.nodes.get_by_ids(&ids).await?;

        let mut payload = HashMap::new();
        for ((id, embedding), value) in updates.iter().zip(existing) {
            let Some(value) = value else {
                debug!(node_id = %id, "skipping embedding for deleted node");
                continue;
            };
            let mut node: IdeaNode = decode(value)?;
            node.embedding = Some(embedding.clone());
            payload.insert(id.clone(), encode(&node)?);
        }

        self.nodes.upsert(payload).await?;
        self.nodes.sync_if_dirty().await
    }

    /// Deletes a node and every evidence ref attached to it.
    pub async fn delete_node(&self, id: &str) -> StorageResult<()> {
        let refs = self.evidence_for_node(id).await?;
        let ref_ids: Vec<String> = refs.into_iter().map(|r| r.id).collect();
        self.evidence_refs.delete(&ref_ids).await?;
        self.nodes.delete(&[id.to_string()]).await?;
        self.evidence_refs.sync_if_dirty().await?;
        self.nodes.sync_if_dirty().await
    }

    // --- evidence ---

    pub async fn insert_evidence(&self, refs: &[EvidenceRef]) -> StorageResult<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let mut payload = HashMap::new();
        for evidence in refs {
            payload.insert(evidence.id.clone(), encode(evidence)?);
        }
        self.evidence_refs.upsert(payload).await?;
        self.evidence_refs.sync_if_dirty().await
    }

    pub async fn evidence_for_node(&self, node_id: &str) -> StorageResult<Vec<EvidenceRef>> {
        scan(&self.evidence_refs, |r: &EvidenceRef| {
            r.node_id.as_deref() == Some(node_id)
        })
        .await
    }

    pub async fn evidence_for_edge(&self, edge_id: &str) -> StorageResult<Vec<EvidenceRef>> {
        scan(&self.evidence_refs, |r: &EvidenceRef| {
            r.edge_id.as_deref() == Some(edge_id)
        })
        .await
    }

    /// Node evidence (not edge evidence) citing `document_id`.
    pub async fn node_evidence_for_document(
        &self,
        document_id: &str,
    ) -> StorageResult<Vec<EvidenceRef>> {
        scan(&self.evidence_refs, |r: &EvidenceRef| {
            r.node_id.is_some() && r.document_id == document_id
        })
        .await
    }

    pub async fn set_evidence_locator(&self, id: &str, locator: String) -> StorageResult<()> {
        let mut evidence: EvidenceRef = fetch(&self.evidence_refs, id)
            .await?
            .ok_or_else(|| anyhow!("evidence ref {id} not found"))?;
        evidence.locator = Some(locator);
        put(&self.evidence_refs, id, &evidence).await
    }

    // --- edges ---

    pub async fn insert_edge(&self, edge: &Edge) -> StorageResult<()> {
        put(&self.edges, &edge.id, edge).await
    }

    pub async fn list_edges(&self, project_id: &str) -> StorageResult<Vec<Edge>> {
        scan(&self.edges, |edge: &Edge| edge.project_id == project_id).await
    }

    /// Removes every edge of the project and its evidence; returns the
    /// number of edges removed.
    pub async fn clear_edges(&self, project_id: &str) -> StorageResult<usize> {
        let edges = self.list_edges(project_id).await?;
        if edges.is_empty() {
            return Ok(0);
        }

        let edge_ids: Vec<String> = edges.iter().map(|e| e.id.clone()).collect();
        let ref_ids: Vec<String> = scan(&self.evidence_refs, |r: &EvidenceRef| {
            r.edge_id.as_ref().is_some_and(|id| edge_ids.contains(id))
        })
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

        self.evidence_refs.delete(&ref_ids).await?;
        self.edges.delete(&edge_ids).await?;
        self.evidence_refs.sync_if_dirty().await?;
        self.edges.sync_if_dirty().await?;
        Ok(edge_ids.len())
    }

    // --- jobs ---

    pub async fn put_job(&self, job: &Job) -> StorageResult<()> {
        put(&self.jobs, &job.id, job).await
    }

    pub async fn get_job(&self, id: &str) -> StorageResult<Option<Job>> {
        fetch(&self.jobs, id).await
    }

    /// Jobs of one type for a project, newest first.
    pub async fn list_jobs(&self, project_id: &str, job_type: JobType) -> StorageResult<Vec<Job>> {
        let mut jobs = scan(&self.jobs, |job: &Job| {
            job.project_id == project_id && job.job_type == job_type
        })
        .await?;
        jobs.reverse();
        Ok(jobs)
    }

    // --- candidate pairs ---

    pub async fn insert_candidate_pairs(&self, pairs: &[CandidatePair]) -> StorageResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut payload = HashMap::new();
        for pair in pairs {
            let key = compute_mdhash_id(
                &format!(
                    "{}:{}:{}:{}",
                    pair.job_id, pair.batch_index, pair.source_node_id, pair.target_node_id
                ),
                "pair-",
            );
            payload.insert(key, encode(pair)?);
        }
        self.candidate_pairs.upsert(payload).await?;
        self.candidate_pairs.sync_if_dirty().await
    }

    /// Pairs of one batch, most similar first.
    pub async fn pairs_for_batch(
        &self,
        job_id: &str,
        batch_index: usize,
    ) -> StorageResult<Vec<CandidatePair>> {
        let mut pairs = scan(&self.candidate_pairs, |pair: &CandidatePair| {
            pair.job_id == job_id && pair.batch_index == batch_index
        })
        .await?;
        pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(pairs)
    }

    pub async fn count_candidate_pairs(&self, job_id: &str) -> StorageResult<usize> {
        Ok(self.candidate_pair_keys(job_id).await?.len())
    }

    pub async fn clear_candidate_pairs(&self, job_id: &str) -> StorageResult<usize> {
        let keys = self.candidate_pair_keys(job_id).await?;
        self.candidate_pairs.delete(&keys).await?;
        self.candidate_pairs.sync_if_dirty().await?;
        Ok(keys.len())
    }

    async fn candidate_pair_keys(&self, job_id: &str) -> StorageResult<Vec<String>> {
        let all = self.candidate_pairs.scan().await?;
        Ok(all
            .into_iter()
            .filter(|(_, value)| value.get("jobId").and_then(Value::as_str) == Some(job_id))
            .map(|(key, _)| key)
            .collect())
    }
}

fn encode<T: Serialize>(record: &T) -> StorageResult<Value> {
    serde_json::to_value(record).context("failed to encode record")
}

fn decode<T: DeserializeOwned>(value: Value) -> StorageResult<T> {
    serde_json::from_value(value).context("failed to decode stored record")
}

async fn put<T: Serialize>(storage: &JsonKvStorage, id: &str, record: &T) -> StorageResult<()> {
    let mut payload = HashMap::new();
    payload.insert(id.to_string(), encode(record)?);
    storage.upsert(payload).await?;
    storage.sync_if_dirty().await
}

async fn fetch<T: DeserializeOwned>(storage: &JsonKvStorage, id: &str) -> StorageResult<Option<T>> {
    storage.get_by_id(id).await?.map(decode).transpose()
}

/// Records matching `keep`, in insertion order.
async fn scan<T, F>(storage: &JsonKvStorage, keep: F) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let mut records = Vec::new();
    for (key, value) in storage.scan().await? {
        let record: T = decode(value).with_context(|| format!("corrupt record {key}"))?;
        if keep(&record) {
            records.push(record);
        }
    }
    Ok(records)
}
