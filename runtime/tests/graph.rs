mod common;

use common::{PROJECT, document, node, node_evidence, open_store, temp_working_dir};
use ideagraph::{
    pipeline::types::{Edge, EvidenceRef, RelationshipType},
    routes::graph::load_graph,
};

const ATTENTION: &str = "Self-attention enables parallel processing of every token.";
const RECURRENCE: &str = "Recurrent networks process tokens one step at a time in order.";
const LOCATOR: &str =
    "{\"page\":3,\"text\":\"Self-attention\",\"boxes\":[{\"x\":72.0,\"y\":80.0,\"width\":60.0,\"height\":12.0}]}";

#[tokio::test]
async fn graph_lists_nodes_and_edges_with_evidence_sources() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    store.put_document(&document("doc-1", "attention.pdf", Some("file-1"))).await?;
    store.insert_node(&node("n1", "Attention")).await?;
    store.insert_node(&node("n2", "Recurrence")).await?;
    store
        .insert_edge(&Edge {
            id: "e1".into(),
            project_id: PROJECT.into(),
            source_node_id: "n1".into(),
            target_node_id: "n2".into(),
            kind: RelationshipType::Contradicts,
            confidence: 0.8,
            reasoning: Some("Parallel versus sequential.".into()),
        })
        .await?;
    store
        .insert_evidence(&[
            EvidenceRef::for_node("ev-1".into(), "n1", "doc-1", ATTENTION.into(), Some(LOCATOR.into())),
            node_evidence("ev-2", "n2", "doc-gone", RECURRENCE),
            EvidenceRef::for_edge("ev-3".into(), "e1", "doc-1", ATTENTION.into(), Some("not json".into())),
        ])
        .await?;

    let graph = load_graph(&store, PROJECT).await?;

    let labels: Vec<&str> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["Attention", "Recurrence"]);

    let attention = &graph.nodes[0].evidence;
    assert_eq!(attention.len(), 1);
    assert_eq!(attention[0].filename.as_deref(), Some("attention.pdf"));
    let locator = attention[0].locator.as_ref().expect("locator");
    assert_eq!(locator.page, 3);
    assert_eq!(locator.boxes.len(), 1);

    // Evidence pointing at an unknown document keeps its id but no filename.
    let recurrence = &graph.nodes[1].evidence;
    assert_eq!(recurrence[0].document_id, "doc-gone");
    assert!(recurrence[0].filename.is_none());

    assert_eq!(graph.edges.len(), 1);
    let edge = &graph.edges[0];
    assert_eq!((edge.source_node_id.as_str(), edge.target_node_id.as_str()), ("n1", "n2"));
    assert_eq!(edge.evidence.len(), 1);
    assert_eq!(edge.evidence[0].filename.as_deref(), Some("attention.pdf"));
    assert!(edge.evidence[0].locator.is_none());

    let json = serde_json::to_value(&graph)?;
    assert_eq!(json["edges"][0]["type"], "contradicts");
    assert_eq!(json["edges"][0]["sourceNodeId"], "n1");
    assert_eq!(json["nodes"][0]["evidence"][0]["documentId"], "doc-1");
    Ok(())
}

#[tokio::test]
async fn graph_of_another_project_is_empty() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store = open_store(&dir).await?;
    store.insert_node(&node("n1", "Attention")).await?;

    let graph = load_graph(&store, "project-2").await?;
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());
    Ok(())
}
