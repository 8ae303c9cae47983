//! Reciprocal Rank Fusion of the two retrieval channels.
//!
//! The vector and keyword channels score on incomparable scales (cosine
//! similarity vs. bm25), so the merge is rank-based: each hit contributes
//! `1/(k + rank)` per list it appears in, with `k` = [`RRF_K`] smoothing
//! the gap between the top ranks. No normalization of raw scores is
//! needed, and the resulting ordering is reproducible regardless of
//! either channel's score magnitudes.

use std::collections::HashMap;

use crate::models::{FusedResult, SearchHit};

/// RRF smoothing constant. Flattens the influence of rank 1 vs rank 2.
pub const RRF_K: f64 = 60.0;

/// Merge the two ranked lists into one ordered, deduplicated result list.
///
/// For every verse appearing in either list, the combined score is
/// `Σ 1/(RRF_K + rank)` over the lists containing it (ranks are 1-based;
/// absence contributes 0). A verse present in both lists appears once
/// with the summed score. Results are sorted descending by combined
/// score — ties keep first-encountered order, vector list before keyword
/// list — and truncated to `limit`.
pub fn fuse(
    vector_hits: Vec<SearchHit>,
    keyword_hits: Vec<SearchHit>,
    limit: usize,
) -> Vec<FusedResult> {
    // First-encountered order doubles as the deterministic tie-breaker.
    let mut order: Vec<i64> = Vec::with_capacity(vector_hits.len() + keyword_hits.len());
    let mut merged: HashMap<i64, FusedResult> = HashMap::new();

    for hits in [vector_hits, keyword_hits] {
        for (i, hit) in hits.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (i + 1) as f64);
            match merged.get_mut(&hit.verse_id) {
                Some(existing) => existing.score += contribution,
                None => {
                    order.push(hit.verse_id);
                    merged.insert(
                        hit.verse_id,
                        FusedResult {
                            hit,
                            score: contribution,
                        },
                    );
                }
            }
        }
    }

    let mut results: Vec<FusedResult> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect();

    // Stable sort: equal scores keep encounter order.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);

    results
}
