use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    error_reporter::ErrorReporter,
    job_tracker::{JobProgress, JobTracker},
    similarity::{batch_count, batch_index, find_duplicates, rank_candidates},
    types::{CandidatePair, Edge, EvidenceRef, IdeaNode},
    utils::{generate_id, pluralize},
};
use crate::{
    ai::{ClassifiedEdge, Embedder, RelationshipClassifier},
    evidence::ExcerptRule,
    storage::GraphStore,
};

#[derive(Debug, Clone)]
pub struct LinkingConfig {
    pub duplicate_threshold: f64,
    pub candidate_threshold: f64,
    pub batch_size: usize,
    pub min_edge_confidence: f64,
    pub excerpt_rule: ExcerptRule,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.88,
            candidate_threshold: 0.4,
            batch_size: 20,
            min_edge_confidence: 0.5,
            excerpt_rule: ExcerptRule::default(),
        }
    }
}

/// Everything the next batch step needs besides the persisted candidate
/// pairs. Small enough to travel through the scheduler queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCursor {
    pub job_id: String,
    pub project_id: String,
    pub batch_index: usize,
    pub total_batches: usize,
    pub links_created: usize,
    pub node_count: usize,
    pub duplicates_removed: usize,
}

pub struct LinkingOrchestrator {
    store: Arc<GraphStore>,
    jobs: Arc<JobTracker>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<dyn RelationshipClassifier>,
    reporter: ErrorReporter,
    config: LinkingConfig,
}

impl LinkingOrchestrator {
    pub fn new(
        store: Arc<GraphStore>,
        jobs: Arc<JobTracker>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<dyn RelationshipClassifier>,
        config: LinkingConfig,
    ) -> Self {
        Self {
            store,
            reporter: ErrorReporter::new(jobs.clone()),
            jobs,
            embedder,
            classifier,
            config,
        }
    }

    /// Setup phase. Returns the first batch to process, or `None` when the
    /// job already reached a terminal state.
    pub async fn run(&self, job_id: &str, project_id: &str) -> Option<BatchCursor> {
        match self.setup(job_id, project_id).await {
            Ok(cursor) => cursor,
            Err(err) => {
                self.fail(job_id, "linking_setup", &err).await;
                None
            }
        }
    }

    /// Batch phase. Returns the cursor of the following batch, if any.
    pub async fn process_batch(&self, cursor: BatchCursor) -> Option<BatchCursor> {
        let job_id = cursor.job_id.clone();
        match self.batch(cursor).await {
            Ok(next) => next,
            Err(err) => {
                self.fail(&job_id, "linking_batch", &err).await;
                None
            }
        }
    }

    async fn setup(&self, job_id: &str, project_id: &str) -> Result<Option<BatchCursor>> {
        self.jobs.mark_running(job_id).await?;
        self.jobs
            .update_progress(job_id, &JobProgress::message("Clearing previous links…"))
            .await?;

        let removed_edges = self.store.clear_edges(project_id).await?;
        let loading = if removed_edges > 0 {
            format!(
                "Removed {}. Loading ideas…",
                pluralize(removed_edges, "old link", "s")
            )
        } else {
            "Loading ideas…".to_string()
        };
        self.jobs
            .update_progress(job_id, &JobProgress::message(loading))
            .await?;

        let nodes = self.store.list_nodes(project_id).await?;
        if nodes.len() < 2 {
            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "Only {} found — need at least 2 to link",
                        pluralize(nodes.len(), "idea", "s")
                    ))
                    .links_created(0),
                )
                .await?;
            self.jobs.mark_completed(job_id).await?;
            return Ok(None);
        }

        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Generating embeddings for {}…",
                    pluralize(nodes.len(), "idea", "s")
                )),
            )
            .await?;
        let embeddings = self.embed_nodes(&nodes).await?;
        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Embeddings ready. Comparing {} for similarity…",
                    pluralize(nodes.len(), "idea", "s")
                )),
            )
            .await?;

        let merged = find_duplicates(&embeddings, self.config.duplicate_threshold);
        for &idx in &merged {
            debug!(job_id = %job_id, node_id = %nodes[idx].id, label = %nodes[idx].label, "merging duplicate idea");
            self.store.delete_node(&nodes[idx].id).await?;
        }
        let merged: HashSet<usize> = merged.into_iter().collect();
        let (survivors, survivor_embeddings): (Vec<&IdeaNode>, Vec<&Vec<f32>>) = nodes
            .iter()
            .zip(&embeddings)
            .enumerate()
            .filter(|(idx, _)| !merged.contains(idx))
            .map(|(_, pair)| pair)
            .unzip();
        if !merged.is_empty() {
            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "Removed {}. {} remaining.",
                        pluralize(merged.len(), "duplicate idea", "s"),
                        pluralize(survivors.len(), "unique idea", "s")
                    )),
                )
                .await?;
        }

        let ranked = rank_candidates(&survivor_embeddings, self.config.candidate_threshold);
        if ranked.is_empty() {
            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "No related pairs found among {}",
                        pluralize(survivors.len(), "idea", "s")
                    ))
                    .links_created(0),
                )
                .await?;
            self.jobs.mark_completed(job_id).await?;
            info!(job_id = %job_id, project_id = %project_id, nodes = survivors.len(), "no candidate pairs");
            return Ok(None);
        }

        let pairs: Vec<CandidatePair> = ranked
            .iter()
            .enumerate()
            .map(|(rank, pair)| CandidatePair {
                job_id: job_id.to_string(),
                source_node_id: survivors[pair.source].id.clone(),
                target_node_id: survivors[pair.target].id.clone(),
                similarity: pair.similarity,
                batch_index: batch_index(rank, self.config.batch_size),
            })
            .collect();
        self.store.insert_candidate_pairs(&pairs).await?;

        let total_batches = batch_count(pairs.len(), self.config.batch_size);
        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Found {}. Classifying in {}…",
                    pluralize(pairs.len(), "candidate pair", "s"),
                    pluralize(total_batches, "batch", "es")
                ))
                .current(0)
                .total(total_batches)
                .links_created(0),
            )
            .await?;
        info!(
            job_id = %job_id,
            project_id = %project_id,
            nodes = survivors.len(),
            duplicates = merged.len(),
            pairs = pairs.len(),
            batches = total_batches,
            "linking setup finished"
        );

        Ok(Some(BatchCursor {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
            batch_index: 0,
            total_batches,
            links_created: 0,
            node_count: survivors.len(),
            duplicates_removed: merged.len(),
        }))
    }

    async fn embed_nodes(&self, nodes: &[IdeaNode]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = nodes.iter().map(IdeaNode::embedding_text).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != nodes.len() {
            bail!(
                "embedding count mismatch: expected {}, got {}",
                nodes.len(),
                embeddings.len()
            );
        }

        let updates: Vec<(String, Vec<f32>)> = nodes
            .iter()
            .zip(&embeddings)
            .map(|(node, embedding)| (node.id.clone(), embedding.clone()))
            .collect();
        self.store.save_embeddings(&updates).await?;
        Ok(embeddings)
    }

    async fn batch(&self, cursor: BatchCursor) -> Result<Option<BatchCursor>> {
        let pairs = self
            .store
            .pairs_for_batch(&cursor.job_id, cursor.batch_index)
            .await?;
        if pairs.is_empty() {
            debug!(job_id = %cursor.job_id, batch = cursor.batch_index, "empty batch");
            return self.advance(cursor, 0).await;
        }

        self.jobs
            .update_progress(
                &cursor.job_id,
                &JobProgress::message(format!(
                    "Classifying batch {} of {}…",
                    cursor.batch_index + 1,
                    cursor.total_batches
                )),
            )
            .await?;

        let mut nodes: HashMap<String, IdeaNode> = HashMap::new();
        for pair in &pairs {
            for id in [&pair.source_node_id, &pair.target_node_id] {
                if nodes.contains_key(id) {
                    continue;
                }
                if let Some(node) = self.store.get_node(id).await? {
                    nodes.insert(id.clone(), node);
                }
            }
        }

        let (description, valid_ids) = describe_pairs(&pairs, &nodes);
        if valid_ids.is_empty() {
            warn!(job_id = %cursor.job_id, batch = cursor.batch_index, "no pair in batch has both nodes, skipping");
            return self.advance(cursor, 0).await;
        }

        let classified = self.classifier.classify(&description).await?;
        let returned = classified.len();
        let mut created = 0usize;
        for edge in classified {
            if !valid_ids.contains(&edge.source_id) || !valid_ids.contains(&edge.target_id) {
                debug!(source_id = %edge.source_id, target_id = %edge.target_id, "classified edge references unknown node");
                continue;
            }
            if edge.confidence < self.config.min_edge_confidence {
                debug!(source_id = %edge.source_id, target_id = %edge.target_id, confidence = edge.confidence, "classified edge below confidence floor");
                continue;
            }
            self.persist_edge(&cursor.project_id, edge).await?;
            created += 1;
        }
        debug!(job_id = %cursor.job_id, batch = cursor.batch_index, returned, created, "batch classified");

        self.advance(cursor, created).await
    }

    async fn persist_edge(&self, project_id: &str, classified: ClassifiedEdge) -> Result<()> {
        let edge = Edge {
            id: generate_id("edge"),
            project_id: project_id.to_string(),
            source_node_id: classified.source_id,
            target_node_id: classified.target_id,
            kind: classified.kind,
            confidence: classified.confidence.clamp(0.0, 1.0),
            reasoning: classified.reasoning,
        };
        self.store.insert_edge(&edge).await?;

        let source_refs = self.store.evidence_for_node(&edge.source_node_id).await?;
        let Some(first) = source_refs.into_iter().next() else {
            return Ok(());
        };

        let classifier_excerpt = classified
            .evidence
            .as_deref()
            .and_then(|text| self.config.excerpt_rule.check(text).ok());
        let evidence = match classifier_excerpt {
            Some(excerpt) => {
                EvidenceRef::for_edge(generate_id("ev"), &edge.id, &first.document_id, excerpt, None)
            }
            None => EvidenceRef::for_edge(
                generate_id("ev"),
                &edge.id,
                &first.document_id,
                first.excerpt,
                first.locator,
            ),
        };
        self.store.insert_evidence(&[evidence]).await?;
        Ok(())
    }

    async fn advance(&self, mut cursor: BatchCursor, created: usize) -> Result<Option<BatchCursor>> {
        cursor.links_created += created;
        let completed = cursor.batch_index + 1;

        if completed < cursor.total_batches {
            self.jobs
                .update_progress(
                    &cursor.job_id,
                    &JobProgress::message(format!(
                        "Batch {} done — {} created so far…",
                        completed,
                        pluralize(cursor.links_created, "link", "s")
                    ))
                    .current(completed)
                    .links_created(cursor.links_created),
                )
                .await?;
            cursor.batch_index = completed;
            return Ok(Some(cursor));
        }

        self.jobs
            .update_progress(
                &cursor.job_id,
                &JobProgress::message("All batches complete")
                    .current(cursor.total_batches)
                    .links_created(cursor.links_created),
            )
            .await?;
        self.finish(&cursor).await?;
        Ok(None)
    }

    async fn finish(&self, cursor: &BatchCursor) -> Result<()> {
        let cleared = self.store.clear_candidate_pairs(&cursor.job_id).await?;

        let mut message = format!(
            "Done — created {} between {}",
            pluralize(cursor.links_created, "link", "s"),
            pluralize(cursor.node_count, "idea", "s")
        );
        if cursor.duplicates_removed > 0 {
            message.push_str(&format!(
                " (removed {})",
                pluralize(cursor.duplicates_removed, "duplicate", "s")
            ));
        }
        self.jobs
            .update_progress(&cursor.job_id, &JobProgress::message(message))
            .await?;
        self.jobs.mark_completed(&cursor.job_id).await?;
        info!(
            job_id = %cursor.job_id,
            project_id = %cursor.project_id,
            links = cursor.links_created,
            cleared_pairs = cleared,
            "linking finished"
        );
        Ok(())
    }

    async fn fail(&self, job_id: &str, stage: &str, err: &anyhow::Error) {
        self.reporter.job_failed(job_id, stage, err).await;
        if let Err(clear_err) = self.store.clear_candidate_pairs(job_id).await {
            warn!(job_id = %job_id, error = %clear_err, "failed to clear candidate pairs");
        }
    }
}

/// Prompt text for one batch plus the node ids it mentions. Pairs with a
/// missing node are left out.
pub fn describe_pairs(
    pairs: &[CandidatePair],
    nodes: &HashMap<String, IdeaNode>,
) -> (String, HashSet<String>) {
    let mut valid_ids = HashSet::new();
    let mut blocks = Vec::new();

    for pair in pairs {
        let (Some(source), Some(target)) = (
            nodes.get(&pair.source_node_id),
            nodes.get(&pair.target_node_id),
        ) else {
            continue;
        };
        valid_ids.insert(source.id.clone());
        valid_ids.insert(target.id.clone());
        blocks.push(format!(
            "- Pair: \"{}\" (ID: {}) ↔ \"{}\" (ID: {})\n  Source summary: {}\n  Target summary: {}\n  Cosine similarity: {:.3}",
            source.label,
            source.id,
            target.label,
            target.id,
            source.summary,
            target.summary,
            pair.similarity
        ));
    }

    (blocks.join("\n\n"), valid_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str) -> IdeaNode {
        IdeaNode {
            id: id.into(),
            project_id: "p1".into(),
            label: label.into(),
            summary: format!("{label} summary"),
            tags: vec![],
            confidence: None,
            embedding: None,
        }
    }

    fn pair(source: &str, target: &str, similarity: f64) -> CandidatePair {
        CandidatePair {
            job_id: "job-1".into(),
            source_node_id: source.into(),
            target_node_id: target.into(),
            similarity,
            batch_index: 0,
        }
    }

    #[test]
    fn description_lists_each_pair() {
        let nodes: HashMap<String, IdeaNode> = [node("n1", "Attention"), node("n2", "Recurrence")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let (text, ids) = describe_pairs(&[pair("n1", "n2", 0.51234)], &nodes);

        assert_eq!(
            text,
            "- Pair: \"Attention\" (ID: n1) ↔ \"Recurrence\" (ID: n2)\n  Source summary: Attention summary\n  Target summary: Recurrence summary\n  Cosine similarity: 0.512"
        );
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn pairs_with_missing_nodes_are_skipped() {
        let nodes: HashMap<String, IdeaNode> = [node("n1", "A"), node("n3", "C")]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let (text, ids) = describe_pairs(&[pair("n1", "n2", 0.9), pair("n1", "n3", 0.6)], &nodes);

        assert!(!text.contains("n2"));
        assert_eq!(text.matches("- Pair:").count(), 1);
        assert!(ids.contains("n1") && ids.contains("n3"));
        assert!(!ids.contains("n2"));
    }

    #[test]
    fn cursor_round_trips_through_json() {
        let cursor = BatchCursor {
            job_id: "job-1".into(),
            project_id: "p1".into(),
            batch_index: 2,
            total_batches: 3,
            links_created: 7,
            node_count: 12,
            duplicates_removed: 1,
        };
        let value = serde_json::to_value(&cursor).unwrap();
        assert_eq!(value["batchIndex"], 2);
        let back: BatchCursor = serde_json::from_value(value).unwrap();
        assert_eq!(back, cursor);
    }
}
