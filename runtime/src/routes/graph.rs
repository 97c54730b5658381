use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use super::{
    internal_error,
    types::{EdgeResponse, EvidenceResponse, GraphResponse, NodeResponse},
};
use crate::{AppState, pipeline::types::EvidenceRef, storage::GraphStore};

pub fn graph_routes() -> Router<Arc<AppState>> {
    Router::new().route("/projects/{project_id}/graph", get(get_graph))
}

async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<GraphResponse>, (StatusCode, String)> {
    load_graph(&state.store, &project_id)
        .await
        .map(Json)
        .map_err(|err| internal_error("failed to load graph", err))
}

pub async fn load_graph(store: &GraphStore, project_id: &str) -> anyhow::Result<GraphResponse> {
    let filenames: HashMap<String, String> = store
        .list_documents(project_id)
        .await?
        .into_iter()
        .map(|doc| (doc.id, doc.filename))
        .collect();
    let evidence = |refs: Vec<EvidenceRef>| -> Vec<EvidenceResponse> {
        refs.into_iter()
            .map(|r| {
                let filename = filenames.get(&r.document_id).cloned();
                EvidenceResponse::from_ref(r, filename)
            })
            .collect()
    };

    let mut nodes = Vec::new();
    for node in store.list_nodes(project_id).await? {
        let refs = store.evidence_for_node(&node.id).await?;
        nodes.push(NodeResponse {
            id: node.id,
            label: node.label,
            summary: node.summary,
            tags: node.tags,
            confidence: node.confidence,
            evidence: evidence(refs),
        });
    }

    let mut edges = Vec::new();
    for edge in store.list_edges(project_id).await? {
        let refs = store.evidence_for_edge(&edge.id).await?;
        edges.push(EdgeResponse {
            id: edge.id,
            source_node_id: edge.source_node_id,
            target_node_id: edge.target_node_id,
            kind: edge.kind,
            confidence: edge.confidence,
            reasoning: edge.reasoning,
            evidence: evidence(refs),
        });
    }

    Ok(GraphResponse { nodes, edges })
}
