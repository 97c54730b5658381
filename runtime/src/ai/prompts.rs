pub const EXTRACTION_INSTRUCTIONS: &str = "You are an expert knowledge analyst. Extract the key ideas from the provided PDF document.

First, write a one-paragraph summary of the entire document.

For each idea, provide:
- label: a concise title (5-10 words)
- summary: a 1-2 sentence explanation
- tags: 2-5 relevant topic tags
- excerpts: 1-2 direct quotes copied verbatim from the document that support this idea
- confidence: a number between 0 and 1 indicating how well the excerpts support the idea

Focus on the most important and distinct concepts.";

pub const EXTRACTION_REQUEST: &str = "Extract the key ideas from this document.";

pub const CLASSIFICATION_INSTRUCTIONS: &str = "You are an expert knowledge analyst. Given pairs of ideas extracted from documents, classify the relationship between each pair.

For each pair, determine:
- type: one of \"supports\", \"contradicts\", \"extends\", \"similar\", \"example_of\", \"depends_on\"
- confidence: a value between 0 and 1
- evidence: a short quote-level justification (at most one sentence)
- reasoning: a concise rationale for the relationship (1-3 sentences)

Only include pairs with a meaningful relationship and confidence of at least 0.5.
Use the exact sourceId and targetId values provided.

Relationship types:
- supports: one idea provides evidence or backing for the other
- contradicts: the ideas are in tension or disagreement
- extends: one idea builds upon or elaborates the other
- similar: the ideas cover similar ground from different angles
- example_of: one idea is a concrete instance of the other
- depends_on: one idea requires or presupposes the other";

pub fn classification_request(pairs_description: &str) -> String {
    format!("Classify the relationships between these idea pairs:\n\n{pairs_description}")
}
