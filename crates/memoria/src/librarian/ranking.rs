//! Canonical similarity ranking shared by both long-term backends
//!
//! The durable backend and the in-process fallback must rank identically,
//! so scoring, thresholding, ordering and truncation all live here.
//! Ordering: similarity desc, then `created_at` desc, then id desc as the
//! final deterministic arbiter.

use crate::memory::types::{MemoryRecord, SearchResult};

/// Cosine similarity between two vectors, clamped to [-1, 1].
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Score candidates against the query, drop those below the threshold,
/// order by the canonical chain, and truncate to `limit`.
pub fn rank(
    candidates: Vec<MemoryRecord>,
    query_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Vec<SearchResult> {
    if limit == 0 {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|record| {
            let similarity = cosine_similarity(query_embedding, &record.embedding);
            SearchResult { record, similarity }
        })
        .filter(|result| result.similarity >= min_similarity)
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            .then_with(|| b.record.id.cmp(&a.record.id))
    });

    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record_with_embedding(embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord::new("t1", "content", "hash", embedding, HashMap::new())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&v1, &v2);
        assert!(
            (sim - 1.0).abs() < 0.001,
            "Identical vectors should have similarity ~1.0, got: {sim}"
        );
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&v1, &v2);
        assert!(
            sim.abs() < 0.001,
            "Orthogonal vectors should have similarity ~0.0, got: {sim}"
        );
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&v1, &v2);
        assert!(
            (sim + 1.0).abs() < 0.001,
            "Opposite vectors should have similarity ~-1.0, got: {sim}"
        );
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_similarity_descending() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            record_with_embedding(vec![0.0, 1.0]),
            record_with_embedding(vec![1.0, 0.0]),
            record_with_embedding(vec![1.0, 1.0]),
        ];

        let results = rank(candidates, &query, 10, f32::MIN);
        assert_eq!(results.len(), 3);
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results[1].similarity >= results[2].similarity);
        assert!((results[0].similarity - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_rank_applies_threshold() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            record_with_embedding(vec![1.0, 0.0]),
            record_with_embedding(vec![0.0, 1.0]),
        ];

        let results = rank(candidates, &query, 10, 0.5);
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_rank_truncates_to_limit() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<MemoryRecord> = (0..10)
            .map(|_| record_with_embedding(vec![1.0, 0.0]))
            .collect();

        let results = rank(candidates, &query, 3, 0.0);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_rank_zero_limit_returns_empty() {
        let candidates = vec![record_with_embedding(vec![1.0, 0.0])];
        assert!(rank(candidates, &[1.0, 0.0], 0, 0.0).is_empty());
    }

    #[test]
    fn test_equal_similarity_breaks_ties_by_recency() {
        let query = vec![1.0, 0.0];
        let mut older = record_with_embedding(vec![1.0, 0.0]);
        older.created_at -= chrono::Duration::seconds(60);
        let newer = record_with_embedding(vec![1.0, 0.0]);
        let newer_id = newer.id;

        let results = rank(vec![older, newer], &query, 10, 0.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, newer_id);
    }

    #[test]
    fn test_equal_similarity_and_timestamp_breaks_ties_by_id() {
        let query = vec![1.0, 0.0];
        let mut a = record_with_embedding(vec![1.0, 0.0]);
        let mut b = record_with_embedding(vec![1.0, 0.0]);
        let shared = a.created_at;
        b.created_at = shared;
        a.created_at = shared;

        let expected_first = a.id.max(b.id);
        let results = rank(vec![a, b], &query, 10, 0.0);
        assert_eq!(results[0].record.id, expected_first);
    }
}
