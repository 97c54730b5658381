/// Cosine similarity accumulated in `f64`. Mismatched lengths and zero
/// vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Greedy single pass in index order: for each surviving `i`, every later
/// surviving `j` with similarity `>= threshold` is merged into `i`.
///
/// Returns merged indices in the order they were merged. Not transitively
/// closed: `j` merged via `i` no longer absorbs anything itself.
pub fn find_duplicates<V: AsRef<[f32]>>(embeddings: &[V], threshold: f64) -> Vec<usize> {
    let mut merged = vec![false; embeddings.len()];
    let mut order = Vec::new();

    for i in 0..embeddings.len() {
        if merged[i] {
            continue;
        }
        for j in (i + 1)..embeddings.len() {
            if merged[j] {
                continue;
            }
            if cosine_similarity(embeddings[i].as_ref(), embeddings[j].as_ref()) >= threshold {
                merged[j] = true;
                order.push(j);
            }
        }
    }
    order
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedPair {
    pub source: usize,
    pub target: usize,
    pub similarity: f64,
}

/// Unordered pairs with similarity strictly above `threshold`, most similar
/// first. Ties keep generation order.
pub fn rank_candidates<V: AsRef<[f32]>>(embeddings: &[V], threshold: f64) -> Vec<RankedPair> {
    let mut pairs = Vec::new();
    for i in 0..embeddings.len() {
        for j in (i + 1)..embeddings.len() {
            let similarity = cosine_similarity(embeddings[i].as_ref(), embeddings[j].as_ref());
            if similarity > threshold {
                pairs.push(RankedPair {
                    source: i,
                    target: j,
                    similarity,
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    pairs
}

pub fn batch_index(rank: usize, batch_size: usize) -> usize {
    rank / batch_size.max(1)
}

pub fn batch_count(pairs: usize, batch_size: usize) -> usize {
    pairs.div_ceil(batch_size.max(1))
}
