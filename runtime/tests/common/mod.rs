#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use ideagraph::{
    ai::{ClassifiedEdge, Embedder, ExtractedIdea, ExtractionResult, IdeaExtractor, RelationshipClassifier},
    evidence::{PageText, TextLayer, TextRun},
    pipeline::{
        JobTracker, SourceFiles,
        types::{Document, DocumentStatus, EvidenceRef, IdeaNode},
    },
    storage::{GraphStore, GraphStoreConfig},
};
use tempfile::TempDir;

pub const PROJECT: &str = "project-1";
pub const VIEWPORT_HEIGHT: f64 = 792.0;

pub fn temp_working_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

pub async fn open_store(dir: &TempDir) -> Result<Arc<GraphStore>> {
    let store = GraphStore::open(GraphStoreConfig {
        working_dir: dir.path().into(),
        workspace: None,
    })
    .await?;
    Ok(Arc::new(store))
}

pub fn tracker(store: &Arc<GraphStore>) -> Arc<JobTracker> {
    Arc::new(JobTracker::new(store.clone(), Duration::from_secs(900)))
}

pub fn document(id: &str, filename: &str, handle: Option<&str>) -> Document {
    Document {
        id: id.into(),
        project_id: PROJECT.into(),
        filename: filename.into(),
        source_handle: handle.map(str::to_string),
        status: DocumentStatus::Uploaded,
        size_bytes: 1024,
        summary: None,
    }
}

pub fn node(id: &str, label: &str) -> IdeaNode {
    IdeaNode {
        id: id.into(),
        project_id: PROJECT.into(),
        label: label.into(),
        summary: format!("{label} summary"),
        tags: vec![],
        confidence: Some(0.9),
        embedding: None,
    }
}

pub fn node_evidence(id: &str, node_id: &str, document_id: &str, excerpt: &str) -> EvidenceRef {
    EvidenceRef::for_node(id.into(), node_id, document_id, excerpt.into(), None)
}

pub fn idea(label: &str, excerpts: &[&str]) -> ExtractedIdea {
    ExtractedIdea {
        label: label.into(),
        summary: format!("{label} summary"),
        tags: vec!["ml".into()],
        excerpts: excerpts.iter().map(|e| e.to_string()).collect(),
        confidence: Some(0.8),
    }
}

/// Extraction results keyed by source handle; unknown handles fail.
#[derive(Default)]
pub struct FakeExtractor {
    results: HashMap<String, ExtractionResult>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn with(mut self, handle: &str, summary: &str, ideas: Vec<ExtractedIdea>) -> Self {
        self.results.insert(
            handle.into(),
            ExtractionResult {
                document_summary: summary.into(),
                ideas,
            },
        );
        self
    }
}

#[async_trait]
impl IdeaExtractor for FakeExtractor {
    async fn extract_ideas(&self, _document: &Document, source_handle: &str) -> Result<ExtractionResult> {
        self.calls.lock().unwrap().push(source_handle.to_string());
        self.results
            .get(source_handle)
            .cloned()
            .ok_or_else(|| anyhow!("model unavailable"))
    }
}

/// Vectors keyed by node label (the text before the first `:`).
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fail: bool,
}

impl FakeEmbedder {
    pub fn with(mut self, label: &str, vector: &[f32]) -> Self {
        self.vectors.insert(label.into(), vector.to_vec());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            bail!("embedding service unavailable");
        }
        texts
            .iter()
            .map(|text| {
                let label = text.split(':').next().unwrap_or_default();
                self.vectors
                    .get(label)
                    .cloned()
                    .ok_or_else(|| anyhow!("no vector for {label}"))
            })
            .collect()
    }
}

/// Returns queued responses in order, recording each prompt.
#[derive(Default)]
pub struct FakeClassifier {
    responses: Mutex<Vec<Vec<ClassifiedEdge>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn respond(self, edges: Vec<ClassifiedEdge>) -> Self {
        self.responses.lock().unwrap().push(edges);
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl RelationshipClassifier for FakeClassifier {
    async fn classify(&self, pairs_description: &str) -> Result<Vec<ClassifiedEdge>> {
        self.prompts.lock().unwrap().push(pairs_description.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(Vec::new());
        }
        Ok(responses.remove(0))
    }
}

/// In-memory source files keyed by `SourceFiles::cache_key`.
#[derive(Default)]
pub struct FakeSourceFiles {
    files: HashMap<String, Vec<u8>>,
    pub fetches: AtomicUsize,
}

impl FakeSourceFiles {
    pub fn with(mut self, key: &str, pages: &[&str]) -> Self {
        self.files.insert(key.into(), pages.join("\u{c}").into_bytes());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFiles for FakeSourceFiles {
    async fn fetch(&self, document: &Document) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(&self.cache_key(document))
            .cloned()
            .ok_or_else(|| anyhow!("Missing local file for {}", document.filename))
    }
}

/// Treats the buffer as UTF-8 pages separated by form feeds; every word
/// becomes one run laid out left to right on a single line.
pub struct PlainTextLayer;

impl TextLayer for PlainTextLayer {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let text = std::str::from_utf8(bytes)?;
        Ok(text
            .split('\u{c}')
            .enumerate()
            .map(|(idx, page)| {
                let mut x = 72.0;
                let runs = page
                    .split_whitespace()
                    .map(|word| {
                        let width = word.chars().count() as f64 * 5.0;
                        let run = TextRun {
                            text: word.to_string(),
                            width,
                            height: 10.0,
                            transform: [1.0, 0.0, 0.0, 10.0, x, 700.0],
                        };
                        x += width + 3.0;
                        run
                    })
                    .collect();
                PageText {
                    page_number: idx as u32 + 1,
                    viewport_height: VIEWPORT_HEIGHT,
                    runs,
                }
            })
            .collect())
    }
}
