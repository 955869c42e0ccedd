//! Cross-venue market matching: Jaccard token-set similarity over market
//! questions, and cosine similarity over stored embeddings when present.

use crate::models::MarketIndexEntry;

/// Lowercases, strips non-alphanumerics, and keeps tokens with len>2.
fn token_set(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|tok| tok.to_lowercase())
        .filter(|tok| tok.len() > 2)
        .collect()
}

/// Jaccard similarity over normalized token sets, in `[0,1]`.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Cosine similarity between two embedding vectors, in `[-1,1]` (clamped
/// to `[0,1]` since negative cosine never indicates a semantic match).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).max(0.0)
    }
}

/// A candidate cross-venue pairing discovered by auto-matching, not yet
/// persisted as an `ArbMatch`.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub a: MarketIndexEntry,
    pub b: MarketIndexEntry,
    pub similarity: f64,
    pub by_embedding: bool,
}

/// For every cross-venue pair of entries matching the same search term,
/// scores question similarity by Jaccard, falling back to embedding
/// cosine similarity when both sides have a cached embedding. Content-hash
/// gating (regenerate only when `content_hash` changes) lives in the
/// caller, which decides whether to recompute an embedding before calling
/// this function.
pub fn find_candidates(entries: &[MarketIndexEntry], min_confidence: f64) -> Vec<MatchCandidate> {
    let mut out = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let a = &entries[i];
            let b = &entries[j];
            if a.venue == b.venue {
                continue;
            }
            let (similarity, by_embedding) = match (&a.embedding, &b.embedding) {
                (Some(ea), Some(eb)) => (cosine_similarity(ea, eb), true),
                _ => (jaccard_similarity(&a.question, &b.question), false),
            };
            if similarity >= min_confidence {
                out.push(MatchCandidate {
                    a: a.clone(),
                    b: b.clone(),
                    similarity,
                    by_embedding,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_questions_have_similarity_one() {
        let s = jaccard_similarity("Will Trump win the 2024 election", "Will Trump win the 2024 election");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_questions_have_similarity_zero() {
        let s = jaccard_similarity("will it rain tomorrow", "bitcoin price above 100k");
        assert_eq!(s, 0.0);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        let s = cosine_similarity(&v, &v);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
