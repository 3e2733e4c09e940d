//! Hybrid ranking combining semantic and lexical result lists.
//!
//! Uses Weighted Reciprocal Rank Fusion (RRF):
//!
//! ```text
//! score(d) = α / (k + rank_semantic) + (1 - α) / (k + rank_lexical)
//! ```
//!
//! with ranks starting at 1 and α the semantic weight.

use std::collections::HashMap;

/// RRF constant (standard value from literature).
const RRF_K: f32 = 60.0;

/// Default semantic weight for hybrid search.
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub id: String,
    pub score: f32,
    pub semantic_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

/// Fuse two rankings (best first). `semantic_weight` is clamped to `[0, 1]`.
///
/// Returns results sorted by fused score, highest first. Equal scores keep no
/// particular order.
pub fn rrf_fusion(
    semantic_ids: &[String],
    lexical_ids: &[String],
    semantic_weight: f32,
) -> Vec<FusedResult> {
    let mut scores: HashMap<&str, FusedResult> = HashMap::new();

    let sem_weight = semantic_weight.clamp(0.0, 1.0);
    let lex_weight = 1.0 - sem_weight;

    for (rank, id) in semantic_ids.iter().enumerate() {
        scores.insert(
            id.as_str(),
            FusedResult {
                id: id.clone(),
                score: sem_weight / (RRF_K + rank as f32 + 1.0),
                semantic_rank: Some(rank + 1),
                lexical_rank: None,
            },
        );
    }

    for (rank, id) in lexical_ids.iter().enumerate() {
        let rrf_score = lex_weight / (RRF_K + rank as f32 + 1.0);

        scores
            .entry(id.as_str())
            .and_modify(|result| {
                result.score += rrf_score;
                result.lexical_rank = Some(rank + 1);
            })
            .or_insert_with(|| FusedResult {
                id: id.clone(),
                score: rrf_score,
                semantic_rank: None,
                lexical_rank: Some(rank + 1),
            });
    }

    let mut results: Vec<FusedResult> = scores.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_rrf_empty_inputs() {
        assert!(rrf_fusion(&[], &[], 0.5).is_empty());
    }

    #[test]
    fn test_rrf_semantic_only() {
        let results = rrf_fusion(&ids(&["a", "b", "c"]), &[], 0.5);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
        assert_eq!(results[0].semantic_rank, Some(1));
        assert_eq!(results[0].lexical_rank, None);
    }

    #[test]
    fn test_rrf_both_rankings_boost() {
        let results = rrf_fusion(&ids(&["a", "b"]), &ids(&["a", "c"]), 0.5);

        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].lexical_rank, Some(1));

        let expected = 1.0 / (RRF_K + 1.0);
        assert!((results[0].score - expected).abs() < 0.001);
    }

    #[test]
    fn test_rrf_weight_favors_semantic() {
        // a: sem=1 lex=2, b: sem=2 lex=1
        let results = rrf_fusion(&ids(&["a", "b"]), &ids(&["b", "a"]), 0.8);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn test_rrf_weight_favors_lexical() {
        let results = rrf_fusion(&ids(&["a", "b"]), &ids(&["b", "a"]), 0.2);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn test_rrf_weight_clamping() {
        let results = rrf_fusion(&ids(&["a"]), &ids(&["b"]), 1.5);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0 / 61.0).abs() < 0.0001);

        let results = rrf_fusion(&ids(&["a"]), &ids(&["b"]), -0.5);
        assert_eq!(results[0].id, "b");
    }
}
