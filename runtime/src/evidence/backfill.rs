use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use super::{
    locator::{PageText, locate_in_pages},
    text_layer::PageSource,
};
use crate::{
    pipeline::{
        error_reporter::ErrorReporter,
        job_tracker::{JobProgress, JobTracker},
        types::{Document, EvidenceRef},
        utils::pluralize,
    },
    storage::GraphStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BackfillReport {
    /// Evidence refs that received a locator.
    pub updated: usize,
    /// Evidence refs still unlocated after the run.
    pub missing: usize,
    /// Documents that had at least one unlocated excerpt.
    pub documents: usize,
}

/// Fills in locators for node evidence persisted without one.
pub struct LocatorBackfill {
    store: Arc<GraphStore>,
    jobs: Arc<JobTracker>,
    pages: PageSource,
    reporter: ErrorReporter,
    fetch_concurrency: usize,
}

impl LocatorBackfill {
    pub fn new(
        store: Arc<GraphStore>,
        jobs: Arc<JobTracker>,
        pages: PageSource,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            store,
            reporter: ErrorReporter::new(jobs.clone()),
            jobs,
            pages,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    pub async fn run(&self, job_id: &str, project_id: &str) -> Option<BackfillReport> {
        match self.execute(job_id, project_id).await {
            Ok(report) => Some(report),
            Err(err) => {
                self.reporter.job_failed(job_id, "locator_backfill", &err).await;
                None
            }
        }
    }

    async fn execute(&self, job_id: &str, project_id: &str) -> Result<BackfillReport> {
        self.jobs.mark_running(job_id).await?;

        let mut targets: Vec<(Document, Vec<EvidenceRef>)> = Vec::new();
        for document in self.store.list_documents(project_id).await? {
            let unlocated: Vec<EvidenceRef> = self
                .store
                .node_evidence_for_document(&document.id)
                .await?
                .into_iter()
                .filter(|r| r.locator.is_none())
                .collect();
            if !unlocated.is_empty() {
                targets.push((document, unlocated));
            }
        }

        let total = targets.len();
        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Locating excerpts in {}…",
                    pluralize(total, "document", "s")
                ))
                .current(0)
                .total(total),
            )
            .await?;

        let decoded = self
            .decode_sources(targets.iter().map(|(document, _)| document.clone()).collect())
            .await?;

        let mut report = BackfillReport {
            documents: total,
            ..BackfillReport::default()
        };
        for (idx, (document, refs)) in targets.iter().enumerate() {
            let pages = decoded
                .get(&self.pages.cache_key(document))
                .map(Vec::as_slice)
                .unwrap_or_default();
            let excerpts: Vec<&str> = refs.iter().map(|r| r.excerpt.as_str()).collect();
            let found = locate_in_pages(pages, &excerpts);

            for evidence in refs {
                let serialized = match found.get(&evidence.excerpt).map(|l| l.to_json()) {
                    Some(Ok(json)) => json,
                    Some(Err(err)) => {
                        warn!(evidence_id = %evidence.id, error = %err, "dropping unserializable locator");
                        report.missing += 1;
                        continue;
                    }
                    None => {
                        report.missing += 1;
                        continue;
                    }
                };
                self.store
                    .set_evidence_locator(&evidence.id, serialized)
                    .await?;
                report.updated += 1;
            }
            debug!(document_id = %document.id, located = found.len(), excerpts = refs.len(), "backfilled document");

            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "Located excerpts in \"{}\" ({} of {})",
                        document.filename,
                        idx + 1,
                        total
                    ))
                    .current(idx + 1),
                )
                .await?;
        }

        let attempted = report.updated + report.missing;
        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Located {} of {}",
                    report.updated,
                    pluralize(attempted, "excerpt", "s")
                )),
            )
            .await?;
        self.jobs.mark_completed(job_id).await?;
        info!(
            job_id = %job_id,
            project_id = %project_id,
            updated = report.updated,
            missing = report.missing,
            documents = report.documents,
            "locator backfill finished"
        );
        Ok(report)
    }

    /// Decodes each distinct source once. A single failed fetch aborts the
    /// run.
    async fn decode_sources(
        &self,
        documents: Vec<Document>,
    ) -> Result<HashMap<String, Vec<PageText>>> {
        let mut unique: HashMap<String, Document> = HashMap::new();
        for document in documents {
            unique.entry(self.pages.cache_key(&document)).or_insert(document);
        }

        let pages = self.pages.clone();
        stream::iter(unique)
            .map(move |(key, document)| {
                let pages = pages.clone();
                async move {
                    let decoded = pages.load(&document).await?;
                    Ok::<_, anyhow::Error>((key, decoded))
                }
            })
            .buffer_unordered(self.fetch_concurrency)
            .try_collect()
            .await
    }
}
