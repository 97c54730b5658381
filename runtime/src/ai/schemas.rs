use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use ts_rs::TS;

pub const RELATIONSHIP_TYPE_VARIANTS: [&str; 6] = [
    "supports",
    "contradicts",
    "extends",
    "similar",
    "example_of",
    "depends_on",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RelationshipType {
    Supports,
    Contradicts,
    Extends,
    Similar,
    ExampleOf,
    DependsOn,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supports => "supports",
            Self::Contradicts => "contradicts",
            Self::Extends => "extends",
            Self::Similar => "similar",
            Self::ExampleOf => "example_of",
            Self::DependsOn => "depends_on",
        }
    }
}

impl FromStr for RelationshipType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "supports" => Ok(Self::Supports),
            "contradicts" => Ok(Self::Contradicts),
            "extends" => Ok(Self::Extends),
            "similar" => Ok(Self::Similar),
            "example_of" => Ok(Self::ExampleOf),
            "depends_on" => Ok(Self::DependsOn),
            other => Err(anyhow::anyhow!("unknown relationship type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub document_summary: String,
    pub ideas: Vec<ExtractedIdea>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIdea {
    pub label: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub excerpts: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Classifier output before validation; `type` is an unchecked string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClassifiedEdge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub edges: Vec<RawClassifiedEdge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationshipType,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub reasoning: Option<String>,
}

impl RawClassifiedEdge {
    /// `None` for relationship types outside the closed set or a
    /// non-finite confidence.
    pub fn validate(self) -> Option<ClassifiedEdge> {
        let kind = match self.kind.parse::<RelationshipType>() {
            Ok(kind) => kind,
            Err(err) => {
                debug!(source_id = %self.source_id, target_id = %self.target_id, error = %err, "dropping classified edge");
                return None;
            }
        };
        if !self.confidence.is_finite() {
            debug!(source_id = %self.source_id, target_id = %self.target_id, "dropping classified edge with invalid confidence");
            return None;
        }

        Some(ClassifiedEdge {
            source_id: self.source_id,
            target_id: self.target_id,
            kind,
            confidence: self.confidence,
            evidence: non_empty(self.evidence),
            reasoning: non_empty(self.reasoning),
        })
    }
}

impl ClassificationResult {
    pub fn into_edges(self) -> Vec<ClassifiedEdge> {
        self.edges
            .into_iter()
            .filter_map(RawClassifiedEdge::validate)
            .collect()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn extraction_result_schema(max_ideas: usize) -> serde_json::Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "documentSummary": {
                "type": "string",
                "description": "One paragraph summarizing the whole document."
            },
            "ideas": {
                "type": "array",
                "maxItems": max_ideas,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "label": {
                            "type": "string",
                            "description": "A concise title for the idea, 5 to 10 words."
                        },
                        "summary": {
                            "type": "string",
                            "description": "One or two sentences explaining the idea."
                        },
                        "tags": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Two to five topic tags."
                        },
                        "excerpts": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "One or two verbatim quotes from the document supporting the idea."
                        },
                        "confidence": {
                            "type": "number",
                            "description": "Between 0 and 1: how well the excerpts support the idea."
                        }
                    },
                    "required": ["label", "summary", "tags", "excerpts", "confidence"]
                }
            }
        },
        "required": ["documentSummary", "ideas"]
    })
}

pub fn classification_result_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "sourceId": { "type": "string" },
                        "targetId": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": RELATIONSHIP_TYPE_VARIANTS.to_vec()
                        },
                        "confidence": { "type": "number" },
                        "evidence": {
                            "type": "string",
                            "description": "A short quote-level justification, at most one sentence."
                        },
                        "reasoning": {
                            "type": "string",
                            "description": "A concise rationale for the relationship, one to three sentences."
                        }
                    },
                    "required": ["sourceId", "targetId", "type", "confidence", "evidence", "reasoning"]
                }
            }
        },
        "required": ["edges"]
    })
}
