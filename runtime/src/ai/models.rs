use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    prompts,
    responses::{ResponseOptions, ResponsesClient, input_file, input_text},
    schemas::{
        ClassificationResult, ClassifiedEdge, ExtractionResult, classification_result_schema,
        extraction_result_schema,
    },
};
use crate::{config::ModelsConfig, pipeline::types::Document};

#[async_trait]
pub trait IdeaExtractor: Send + Sync {
    /// Reads the uploaded file behind `source_handle` and returns its ideas.
    async fn extract_ideas(&self, document: &Document, source_handle: &str)
    -> Result<ExtractionResult>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait RelationshipClassifier: Send + Sync {
    async fn classify(&self, pairs_description: &str) -> Result<Vec<ClassifiedEdge>>;
}

pub struct OpenAiModels {
    client: Arc<ResponsesClient>,
    config: ModelsConfig,
    max_ideas: usize,
}

impl OpenAiModels {
    pub fn new(client: Arc<ResponsesClient>, config: ModelsConfig, max_ideas: usize) -> Self {
        Self {
            client,
            config,
            max_ideas,
        }
    }

    fn options(&self) -> ResponseOptions {
        ResponseOptions {
            reasoning_effort: self.config.reasoning_effort.clone(),
            service_tier: None,
            background: true,
        }
    }
}

#[async_trait]
impl IdeaExtractor for OpenAiModels {
    async fn extract_ideas(
        &self,
        document: &Document,
        source_handle: &str,
    ) -> Result<ExtractionResult> {
        debug!(document_id = %document.id, filename = %document.filename, "requesting idea extraction");
        let result: ExtractionResult = self
            .client
            .responses_structured(
                &self.config.extraction_model,
                prompts::EXTRACTION_INSTRUCTIONS,
                vec![input_file(source_handle), input_text(prompts::EXTRACTION_REQUEST)],
                "extraction_result",
                extraction_result_schema(self.max_ideas),
                &self.options(),
            )
            .await
            .with_context(|| format!("idea extraction failed for \"{}\"", document.filename))?;
        info!(document_id = %document.id, ideas = result.ideas.len(), "ideas extracted");
        Ok(result)
    }
}

#[async_trait]
impl Embedder for OpenAiModels {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client
            .embeddings(&self.config.embedding_model, texts)
            .await
            .with_context(|| format!("embedding {} texts failed", texts.len()))
    }
}

#[async_trait]
impl RelationshipClassifier for OpenAiModels {
    async fn classify(&self, pairs_description: &str) -> Result<Vec<ClassifiedEdge>> {
        let result: ClassificationResult = self
            .client
            .responses_structured(
                &self.config.classification_model,
                prompts::CLASSIFICATION_INSTRUCTIONS,
                vec![input_text(&prompts::classification_request(pairs_description))],
                "classification_result",
                classification_result_schema(),
                &self.options(),
            )
            .await
            .context("relationship classification failed")?;
        Ok(result.into_edges())
    }
}
