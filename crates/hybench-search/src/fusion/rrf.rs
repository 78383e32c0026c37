//! Reciprocal Rank Fusion over retrieval results.
//!
//! # Algorithm
//!
//! ```text
//! rrf_score(d) = sum over lists L containing d of: 1 / (k + rank_L(d))
//! ```
//!
//! - ranks are 1-based positions in each [`RankedList`]
//! - a document absent from a list contributes 0 for that list
//! - `k` defaults to 60; larger values flatten the advantage of top ranks
//!
//! # Ordering
//!
//! Output is sorted by descending score. Equal scores keep **first-seen
//! order**: documents of the first list in rank order, then documents first
//! seen in the second list in rank order, and so on. The sort is stable over
//! that insertion order, so the same inputs always produce the same output.
//!
//! # Example
//!
//! ```
//! use hybench_core::model::{Document, RankedList};
//! use hybench_search::fusion::rrf_fuse;
//!
//! let lexical = RankedList::from_documents(["A", "B", "C"].map(Document::new));
//! let vector = RankedList::from_documents(["B", "D", "A"].map(Document::new));
//! let fused = rrf_fuse(&[lexical, vector], 60);
//! let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
//! assert_eq!(order, ["B", "A", "D", "C"]);
//! ```

use hybench_core::model::{Document, RankedList};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A fused hit with its score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedDocument {
    /// First occurrence of the id across the input lists.
    pub document: Document,
    /// Accumulated RRF score.
    pub score: f64,
    /// 1-based rank in each input list, `None` where absent. Same order as
    /// the input lists.
    pub ranks: Vec<Option<usize>>,
}

/// Contribution of a single 1-based `rank`.
#[must_use]
pub fn rrf_contribution(rank: usize, k: u32) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let rank = rank as f64;
    1.0 / (f64::from(k) + rank)
}

/// Fuse `lists` into `(id, score)` pairs, best first.
///
/// Empty lists contribute nothing; all lists empty yields an empty result.
#[must_use]
pub fn rrf_fuse(lists: &[RankedList], k: u32) -> Vec<(String, f64)> {
    fuse_documents(lists, k)
        .into_iter()
        .map(|fused| (fused.document.id, fused.score))
        .collect()
}

/// Fuse `lists` keeping each document and its per-list ranks.
#[must_use]
pub fn fuse_documents(lists: &[RankedList], k: u32) -> Vec<FusedDocument> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<FusedDocument> = Vec::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (rank, doc) in list.iter_ranked() {
            let contribution = rrf_contribution(rank, k);
            let slot = *slots.entry(doc.id.as_str()).or_insert_with(|| {
                fused.push(FusedDocument {
                    document: doc.clone(),
                    score: 0.0,
                    ranks: vec![None; lists.len()],
                });
                fused.len() - 1
            });
            let entry = &mut fused[slot];
            entry.score += contribution;
            entry.ranks[list_idx] = Some(rank);
        }
    }

    // Stable: ties stay in first-seen order.
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    fused
}

/// Apply the minimum-text filter to every list identically.
///
/// `None` returns the lists unchanged.
#[must_use]
pub fn prefilter(lists: Vec<RankedList>, min_text_chars: Option<usize>) -> Vec<RankedList> {
    match min_text_chars {
        None => lists,
        Some(min) => lists
            .into_iter()
            .map(|list| list.filter_min_text(min))
            .collect(),
    }
}
