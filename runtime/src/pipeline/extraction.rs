use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::{
    error_reporter::ErrorReporter,
    job_tracker::{JobProgress, JobTracker},
    types::{Document, DocumentStatus, EvidenceRef, IdeaNode},
    utils::{generate_id, pluralize},
};
use crate::{
    ai::{ExtractedIdea, IdeaExtractor},
    evidence::{ExcerptRule, Locator, PageSource, locate_in_pages},
    storage::GraphStore,
};

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub max_ideas: usize,
    pub excerpt_rule: ExcerptRule,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_ideas: 30,
            excerpt_rule: ExcerptRule::default(),
        }
    }
}

/// An idea with its excerpts already validated and deduplicated.
struct PreparedIdea {
    idea: ExtractedIdea,
    excerpts: Vec<String>,
}

pub struct ExtractionOrchestrator {
    store: Arc<GraphStore>,
    jobs: Arc<JobTracker>,
    extractor: Arc<dyn IdeaExtractor>,
    inline_pages: Option<PageSource>,
    reporter: ErrorReporter,
    config: ExtractionConfig,
}

impl ExtractionOrchestrator {
    pub fn new(
        store: Arc<GraphStore>,
        jobs: Arc<JobTracker>,
        extractor: Arc<dyn IdeaExtractor>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            reporter: ErrorReporter::new(jobs.clone()),
            jobs,
            extractor,
            inline_pages: None,
            config,
        }
    }

    /// Locate excerpts against the source PDF while saving ideas.
    pub fn with_inline_locating(mut self, pages: PageSource) -> Self {
        self.inline_pages = Some(pages);
        self
    }

    /// Runs the whole job; any failure is recorded on the job record.
    pub async fn run(&self, job_id: &str, project_id: &str, document_ids: &[String]) {
        if let Err(err) = self.execute(job_id, project_id, document_ids).await {
            self.reporter.job_failed(job_id, "extraction", &err).await;
        }
    }

    async fn execute(&self, job_id: &str, project_id: &str, document_ids: &[String]) -> Result<()> {
        self.jobs.mark_running(job_id).await?;
        let total = document_ids.len();
        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Preparing to extract ideas from {}…",
                    pluralize(total, "document", "s")
                ))
                .current(0)
                .total(total)
                .ideas_extracted(0),
            )
            .await?;

        let mut total_ideas = 0usize;
        for (idx, document_id) in document_ids.iter().enumerate() {
            let document = self
                .store
                .get_document(document_id)
                .await?
                .with_context(|| format!("document {document_id} not found"))?;
            if document.project_id != project_id {
                bail!("document {document_id} does not belong to project {project_id}");
            }
            self.store
                .set_document_status(document_id, DocumentStatus::Extracting)
                .await?;

            let Some(handle) = document.source_handle.as_deref().filter(|h| !h.is_empty()) else {
                debug!(document_id = %document_id, "document has no source handle, skipping");
                self.store
                    .set_document_status(document_id, DocumentStatus::Extracted)
                    .await?;
                self.finish_document(job_id, &document, idx, total).await?;
                continue;
            };

            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "Reading \"{}\"… ({} of {})",
                        document.filename,
                        idx + 1,
                        total
                    ))
                    .current(idx),
                )
                .await?;

            let result = self.extractor.extract_ideas(&document, handle).await?;
            let ideas = self.prepare(&document, result.ideas);
            total_ideas += ideas.len();

            self.jobs
                .update_progress(
                    job_id,
                    &JobProgress::message(format!(
                        "Saving {} from \"{}\"…",
                        pluralize(ideas.len(), "idea", "s"),
                        document.filename
                    ))
                    .ideas_extracted(total_ideas),
                )
                .await?;
            self.save_ideas(project_id, &document, &result.document_summary, ideas)
                .await?;

            self.store
                .set_document_status(document_id, DocumentStatus::Extracted)
                .await?;

            self.finish_document(job_id, &document, idx, total).await?;
        }

        self.jobs
            .update_progress(
                job_id,
                &JobProgress::message(format!(
                    "Done — extracted {} from {}",
                    pluralize(total_ideas, "idea", "s"),
                    pluralize(total, "document", "s")
                ))
                .ideas_extracted(total_ideas),
            )
            .await?;
        self.jobs.mark_completed(job_id).await?;
        info!(job_id = %job_id, project_id = %project_id, ideas = total_ideas, documents = total, "extraction finished");
        Ok(())
    }

    async fn finish_document(
        &self,
        job_id: &str,
        document: &Document,
        idx: usize,
        total: usize,
    ) -> Result<()> {
        let finished = if idx + 1 < total {
            format!("Finished \"{}\" — moving to next document…", document.filename)
        } else {
            "Finished extracting from all documents".to_string()
        };
        self.jobs
            .update_progress(job_id, &JobProgress::message(finished).current(idx + 1))
            .await?;
        Ok(())
    }

    /// Caps the idea count, clamps confidence and filters excerpts.
    fn prepare(&self, document: &Document, mut ideas: Vec<ExtractedIdea>) -> Vec<PreparedIdea> {
        if ideas.len() > self.config.max_ideas {
            warn!(
                document_id = %document.id,
                returned = ideas.len(),
                max = self.config.max_ideas,
                "model returned too many ideas, dropping the rest"
            );
            ideas.truncate(self.config.max_ideas);
        }

        ideas
            .into_iter()
            .map(|mut idea| {
                idea.confidence = idea
                    .confidence
                    .filter(|c| c.is_finite())
                    .map(|c| c.clamp(0.0, 1.0));

                let mut accepted = self.config.excerpt_rule.dedup();
                let excerpts = idea
                    .excerpts
                    .iter()
                    .filter_map(|raw| match accepted.accept(raw) {
                        Ok(excerpt) => Some(excerpt),
                        Err(rejection) => {
                            debug!(document_id = %document.id, label = %idea.label, %rejection, "excerpt dropped");
                            None
                        }
                    })
                    .collect();
                PreparedIdea { idea, excerpts }
            })
            .collect()
    }

    async fn save_ideas(
        &self,
        project_id: &str,
        document: &Document,
        document_summary: &str,
        ideas: Vec<PreparedIdea>,
    ) -> Result<()> {
        self.store
            .set_document_summary(&document.id, document_summary)
            .await?;

        let locators = self.locate_excerpts(document, &ideas).await;

        for PreparedIdea { idea, excerpts } in ideas {
            let node = IdeaNode {
                id: generate_id("node"),
                project_id: project_id.to_string(),
                label: idea.label,
                summary: idea.summary,
                tags: idea.tags,
                confidence: idea.confidence,
                embedding: None,
            };
            self.store.insert_node(&node).await?;

            let refs: Vec<EvidenceRef> = excerpts
                .into_iter()
                .map(|excerpt| {
                    let locator = locators.get(&excerpt).and_then(|l| match l.to_json() {
                        Ok(json) => Some(json),
                        Err(err) => {
                            warn!(error = %err, "dropping unserializable locator");
                            None
                        }
                    });
                    EvidenceRef::for_node(generate_id("ev"), &node.id, &document.id, excerpt, locator)
                })
                .collect();
            self.store.insert_evidence(&refs).await?;
        }
        Ok(())
    }

    /// Best effort: failures leave excerpts without a locator.
    async fn locate_excerpts(
        &self,
        document: &Document,
        ideas: &[PreparedIdea],
    ) -> HashMap<String, Locator> {
        let Some(pages) = &self.inline_pages else {
            return HashMap::new();
        };
        let excerpts: Vec<&str> = ideas
            .iter()
            .flat_map(|p| p.excerpts.iter().map(String::as_str))
            .collect();
        if excerpts.is_empty() {
            return HashMap::new();
        }

        match pages.load(document).await {
            Ok(decoded) => {
                let found = locate_in_pages(&decoded, &excerpts);
                debug!(document_id = %document.id, located = found.len(), excerpts = excerpts.len(), "inline locate");
                found
            }
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "inline locating skipped");
                HashMap::new()
            }
        }
    }
}
