pub mod models;
pub mod prompts;
pub mod responses;
pub mod schemas;

pub use models::{Embedder, IdeaExtractor, OpenAiModels, RelationshipClassifier};
pub use responses::ResponsesClient;
pub use schemas::{ClassifiedEdge, ExtractedIdea, ExtractionResult, RelationshipType};
