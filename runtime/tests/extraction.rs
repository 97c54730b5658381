mod common;

use std::sync::Arc;

use common::{
    FakeExtractor, FakeSourceFiles, PROJECT, PlainTextLayer, document, idea, open_store,
    temp_working_dir, tracker,
};
use ideagraph::{
    evidence::{Locator, PageSource},
    pipeline::{
        ExtractionConfig, ExtractionOrchestrator,
        types::{DocumentStatus, JobStatus, JobType},
    },
};

const ATTENTION: &str = "Self-attention enables parallel processing of every token.";
const RECURRENCE: &str = "Recurrent networks process tokens one step at a time in order.";
const SCALING: &str = "Larger models trained on more data keep improving predictably.";

#[tokio::test]
async fn extracts_ideas_with_validated_evidence() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "attention.pdf", Some("file-1"))).await?;
    store.put_document(&document("doc-2", "scaling.pdf", Some("file-2"))).await?;

    let shouted = ATTENTION.to_uppercase();
    let extractor = Arc::new(
        FakeExtractor::default()
            .with(
                "file-1",
                "A paper about attention.",
                vec![
                    idea(
                        "Attention parallelizes",
                        &[ATTENTION, "too short", shouted.as_str()],
                    ),
                    idea("Recurrence is sequential", &[RECURRENCE]),
                ],
            )
            .with("file-2", "A paper about scaling.", vec![idea("Scaling laws", &[SCALING])]),
    );
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        extractor.clone(),
        ExtractionConfig::default(),
    );

    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator
        .run(&job.id, PROJECT, &["doc-1".to_string(), "doc-2".to_string()])
        .await;

    let job = jobs.get(&job.id).await?.expect("job");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_current, Some(2));
    assert_eq!(job.progress_total, Some(2));
    assert_eq!(job.ideas_extracted, Some(3));
    assert_eq!(
        job.progress_message.as_deref(),
        Some("Done — extracted 3 ideas from 2 documents")
    );

    let doc = store.get_document("doc-1").await?.expect("doc");
    assert_eq!(doc.status, DocumentStatus::Extracted);
    assert_eq!(doc.summary.as_deref(), Some("A paper about attention."));

    let nodes = store.list_nodes(PROJECT).await?;
    assert_eq!(nodes.len(), 3);
    let attention = nodes.iter().find(|n| n.label == "Attention parallelizes").unwrap();
    let refs = store.evidence_for_node(&attention.id).await?;
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].excerpt, ATTENTION);
    assert_eq!(refs[0].document_id, "doc-1");
    assert!(refs[0].locator.is_none());
    Ok(())
}

#[tokio::test]
async fn document_without_handle_is_marked_extracted() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "scan.pdf", None)).await?;

    let extractor = Arc::new(FakeExtractor::default());
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        extractor.clone(),
        ExtractionConfig::default(),
    );
    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator.run(&job.id, PROJECT, &["doc-1".to_string()]).await;

    let finished = jobs.get(&job.id).await?.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress_current, Some(1));
    assert_eq!(finished.progress_total, Some(1));
    assert_eq!(
        store.get_document("doc-1").await?.unwrap().status,
        DocumentStatus::Extracted
    );
    assert!(extractor.calls.lock().unwrap().is_empty());
    assert!(store.list_nodes(PROJECT).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn model_failure_fails_job_and_halts_remaining_documents() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "good.pdf", Some("file-1"))).await?;
    store.put_document(&document("doc-2", "bad.pdf", Some("file-broken"))).await?;
    store.put_document(&document("doc-3", "later.pdf", Some("file-1"))).await?;

    let extractor = Arc::new(FakeExtractor::default().with(
        "file-1",
        "Fine.",
        vec![idea("Scaling laws", &[SCALING])],
    ));
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        extractor.clone(),
        ExtractionConfig::default(),
    );
    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    let ids = ["doc-1", "doc-2", "doc-3"].map(String::from);
    orchestrator.run(&job.id, PROJECT, &ids).await;

    let job = jobs.get(&job.id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("model unavailable"));
    assert_eq!(job.progress_current, Some(1));

    assert_eq!(store.get_document("doc-1").await?.unwrap().status, DocumentStatus::Extracted);
    assert_eq!(store.get_document("doc-3").await?.unwrap().status, DocumentStatus::Uploaded);
    assert_eq!(store.list_nodes(PROJECT).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn document_from_another_project_fails_the_job() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    let mut foreign = document("doc-1", "other.pdf", Some("file-1"));
    foreign.project_id = "someone-else".into();
    store.put_document(&foreign).await?;

    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        Arc::new(FakeExtractor::default()),
        ExtractionConfig::default(),
    );
    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator.run(&job.id, PROJECT, &["doc-1".to_string()]).await;

    let job = jobs.get(&job.id).await?.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("does not belong"));
    assert_eq!(store.get_document("doc-1").await?.unwrap().status, DocumentStatus::Uploaded);
    Ok(())
}

#[tokio::test]
async fn ideas_are_capped_and_confidence_clamped() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "many.pdf", Some("file-1"))).await?;

    let mut overconfident = idea("Overconfident", &[ATTENTION]);
    overconfident.confidence = Some(1.7);
    let ideas = vec![
        overconfident,
        idea("Second", &[RECURRENCE]),
        idea("Third", &[SCALING]),
    ];
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        Arc::new(FakeExtractor::default().with("file-1", "Many ideas.", ideas)),
        ExtractionConfig {
            max_ideas: 2,
            ..ExtractionConfig::default()
        },
    );
    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator.run(&job.id, PROJECT, &["doc-1".to_string()]).await;

    let nodes = store.list_nodes(PROJECT).await?;
    let labels: Vec<&str> = nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["Overconfident", "Second"]);
    assert_eq!(nodes[0].confidence, Some(1.0));
    assert_eq!(jobs.get(&job.id).await?.unwrap().ideas_extracted, Some(2));
    Ok(())
}

#[tokio::test]
async fn inline_locating_attaches_locators() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "attention.pdf", Some("file-1"))).await?;

    let results_page = format!("Results show that {ATTENTION}");
    let files = Arc::new(FakeSourceFiles::default().with(
        "file-1",
        &["Introduction to sequence models.", results_page.as_str()],
    ));
    let pages = PageSource::new(files.clone(), Arc::new(PlainTextLayer));
    let extractor = FakeExtractor::default().with(
        "file-1",
        "Attention.",
        vec![
            idea("Attention parallelizes", &[ATTENTION]),
            idea("Recurrence is sequential", &[RECURRENCE]),
        ],
    );
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        Arc::new(extractor),
        ExtractionConfig::default(),
    )
    .with_inline_locating(pages);

    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator.run(&job.id, PROJECT, &["doc-1".to_string()]).await;
    assert_eq!(jobs.get(&job.id).await?.unwrap().status, JobStatus::Completed);
    assert_eq!(files.fetch_count(), 1);

    let refs = store.node_evidence_for_document("doc-1").await?;
    let located = refs.iter().find(|r| r.excerpt == ATTENTION).unwrap();
    let locator = Locator::from_json(located.locator.as_deref().expect("locator"))?;
    assert_eq!(locator.page, 2);
    assert_eq!(locator.boxes.len(), 7);
    assert!(locator.boxes.iter().all(|b| b.width > 0.0 && b.height > 0.0));

    let unlocated = refs.iter().find(|r| r.excerpt == RECURRENCE).unwrap();
    assert!(unlocated.locator.is_none());
    Ok(())
}

#[tokio::test]
async fn inline_locating_failure_keeps_the_job_alive() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    let jobs = tracker(&store);
    store.put_document(&document("doc-1", "attention.pdf", Some("file-1"))).await?;

    let pages = PageSource::new(Arc::new(FakeSourceFiles::default()), Arc::new(PlainTextLayer));
    let orchestrator = ExtractionOrchestrator::new(
        store.clone(),
        jobs.clone(),
        Arc::new(FakeExtractor::default().with(
            "file-1",
            "Attention.",
            vec![idea("Attention parallelizes", &[ATTENTION])],
        )),
        ExtractionConfig::default(),
    )
    .with_inline_locating(pages);

    let job = jobs.create(PROJECT, JobType::Extraction).await?;
    orchestrator.run(&job.id, PROJECT, &["doc-1".to_string()]).await;

    assert_eq!(jobs.get(&job.id).await?.unwrap().status, JobStatus::Completed);
    let refs = store.node_evidence_for_document("doc-1").await?;
    assert_eq!(refs.len(), 1);
    assert!(refs[0].locator.is_none());
    Ok(())
}
