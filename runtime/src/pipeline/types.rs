use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use crate::ai::schemas::RelationshipType;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Extracting,
    Extracted,
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    /// Handle the generative model uses to read the uploaded file.
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct IdeaNode {
    pub id: String,
    pub project_id: String,
    pub label: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl IdeaNode {
    /// Text submitted to the embedding model for this node.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.label, self.summary)
    }
}

/// Excerpt tying an idea or a relationship back to a document.
///
/// Exactly one of `node_id` / `edge_id` is set; use the constructors.
#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EvidenceRef {
    pub id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub edge_id: Option<String>,
    pub document_id: String,
    pub excerpt: String,
    /// Serialized [`crate::evidence::Locator`].
    #[serde(default)]
    pub locator: Option<String>,
}

impl EvidenceRef {
    pub fn for_node(
        id: String,
        node_id: &str,
        document_id: &str,
        excerpt: String,
        locator: Option<String>,
    ) -> Self {
        Self {
            id,
            node_id: Some(node_id.to_string()),
            edge_id: None,
            document_id: document_id.to_string(),
            excerpt,
            locator,
        }
    }

    pub fn for_edge(
        id: String,
        edge_id: &str,
        document_id: &str,
        excerpt: String,
        locator: Option<String>,
    ) -> Self {
        Self {
            id,
            node_id: None,
            edge_id: Some(edge_id.to_string()),
            document_id: document_id.to_string(),
            excerpt,
            locator,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Edge {
    pub id: String,
    pub project_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum JobType {
    Extraction,
    Linking,
    LocatorBackfill,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Linking => "linking",
            Self::LocatorBackfill => "locator_backfill",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extraction" => Ok(Self::Extraction),
            "linking" => Ok(Self::Linking),
            "locator_backfill" => Ok(Self::LocatorBackfill),
            other => Err(anyhow::anyhow!("unknown job type: {other}")),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Job {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress_current: Option<u64>,
    #[serde(default)]
    pub progress_total: Option<u64>,
    #[serde(default)]
    pub progress_message: Option<String>,
    #[serde(default)]
    pub ideas_extracted: Option<u64>,
    #[serde(default)]
    pub links_created: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_progress_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, project_id: &str, job_type: JobType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id: project_id.to_string(),
            job_type,
            status: JobStatus::Pending,
            error: None,
            progress_current: None,
            progress_total: None,
            progress_message: None,
            ideas_extracted: None,
            links_created: None,
            created_at: now,
            last_progress_at: None,
            completed_at: None,
        }
    }

    /// Most recent sign of life: last progress write, else creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_progress_at.unwrap_or(self.created_at)
    }
}

/// Resume data for one linking job, keyed by `(job_id, batch_index)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePair {
    pub job_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub similarity: f64,
    pub batch_index: usize,
}
