use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic content-derived id: `prefix` + hex sha256 of `content`.
pub fn compute_mdhash_id(content: &str, prefix: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{prefix}{digest:x}")
}

/// Random record id, e.g. `node-0b84...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// `count` followed by `noun`, with a plural suffix unless `count == 1`.
pub fn pluralize(count: usize, noun: &str, plural_suffix: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}{plural_suffix}")
    }
}

/// Collapses a multi-line error message into one short line.
pub fn single_line(message: &str, max_chars: usize) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}
