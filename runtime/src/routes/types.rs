use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    evidence::Locator,
    pipeline::types::{DocumentStatus, EvidenceRef, RelationshipType},
};

#[derive(Clone, Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExtractRequest {
    pub document_ids: Vec<String>,
}

/// Registers a PDF already stored under the uploads directory.
#[derive(Clone, Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterDocumentRequest {
    pub filename: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JobStartedResponse {
    pub job_id: String,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DocumentResponse {
    pub id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub size_bytes: u64,
    pub summary: Option<String>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EvidenceResponse {
    pub id: String,
    pub document_id: String,
    pub filename: Option<String>,
    pub excerpt: String,
    pub locator: Option<Locator>,
}

impl EvidenceResponse {
    /// Locators that no longer parse are reported as absent.
    pub fn from_ref(evidence: EvidenceRef, filename: Option<String>) -> Self {
        let locator = evidence
            .locator
            .as_deref()
            .and_then(|raw| Locator::from_json(raw).ok());
        Self {
            id: evidence.id,
            document_id: evidence.document_id,
            filename,
            excerpt: evidence.excerpt,
            locator,
        }
    }
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NodeResponse {
    pub id: String,
    pub label: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
    pub evidence: Vec<EvidenceResponse>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EdgeResponse {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub evidence: Vec<EvidenceResponse>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct GraphResponse {
    pub nodes: Vec<NodeResponse>,
    pub edges: Vec<EdgeResponse>,
}
