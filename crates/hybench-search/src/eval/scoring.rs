//! Page-level match scoring at several cutoffs.
//!
//! For each cutoff `k` the first `k` retrieved documents are mapped to page
//! ids through the configured [`PageScheme`]. A document whose id carries no
//! page still occupies its position. `matched` is a non-empty intersection
//! with the expected pages.
//!
//! NDCG@k uses binary relevance over the page sequence with repeats removed,
//! so several chunks from one relevant page are not double counted.

use chrono::Utc;
use hybench_core::config::{ConfigError, validate_cutoffs};
use hybench_core::model::{CutoffResult, Document, EvaluationRecord, ExpectedPages, QueryKey};
use hybench_core::page::PageScheme;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluator {
    scheme: PageScheme,
    cutoffs: Vec<usize>,
}

impl Evaluator {
    /// # Errors
    ///
    /// Cutoffs that are empty, non-positive, or not strictly increasing.
    pub fn new(scheme: PageScheme, cutoffs: Vec<usize>) -> Result<Self, ConfigError> {
        validate_cutoffs(&cutoffs)?;
        Ok(Self { scheme, cutoffs })
    }

    #[must_use]
    pub fn cutoffs(&self) -> &[usize] {
        &self.cutoffs
    }

    #[must_use]
    pub const fn scheme(&self) -> PageScheme {
        self.scheme
    }

    /// Largest cutoff.
    #[must_use]
    pub fn max_cutoff(&self) -> usize {
        self.cutoffs.last().copied().unwrap_or(0)
    }

    /// Page ids of the first `k` documents, in rank order.
    #[must_use]
    pub fn pages_at(&self, retrieved: &[Document], k: usize) -> Vec<String> {
        retrieved
            .iter()
            .take(k)
            .filter_map(|doc| self.scheme.page_of(doc))
            .collect()
    }

    /// Per-cutoff results for one ranking.
    #[must_use]
    pub fn score(&self, expected: &ExpectedPages, retrieved: &[Document]) -> Vec<CutoffResult> {
        self.cutoffs
            .iter()
            .map(|&k| {
                let pages = self.pages_at(retrieved, k);
                let matched = expected.intersects(pages.iter().map(String::as_str));
                let ndcg = ndcg_at_k(&pages, expected, k);
                CutoffResult {
                    k,
                    pages,
                    matched,
                    ndcg,
                }
            })
            .collect()
    }

    /// Build the full record for one query.
    #[must_use]
    pub fn evaluate(
        &self,
        key: QueryKey,
        row: Option<usize>,
        query: &str,
        expected: ExpectedPages,
        retrieved: &[Document],
        degraded: bool,
    ) -> EvaluationRecord {
        let cutoffs = self.score(&expected, retrieved);
        EvaluationRecord {
            key,
            row,
            query: query.to_string(),
            expected,
            cutoffs,
            degraded,
            evaluated_at: Utc::now(),
        }
    }
}

/// Binary-relevance NDCG@k over `pages` with repeats removed.
///
/// Returns 0.0 when nothing is expected.
#[must_use]
pub fn ndcg_at_k(pages: &[String], expected: &ExpectedPages, k: usize) -> f64 {
    if expected.is_empty() || k == 0 {
        return 0.0;
    }

    let mut seen = HashSet::new();
    let dcg: f64 = pages
        .iter()
        .filter(|p| seen.insert(p.as_str()))
        .take(k)
        .enumerate()
        .filter(|(_, page)| expected.contains(page))
        .map(|(i, _)| discount(i))
        .sum();

    let ideal: f64 = (0..expected.len().min(k)).map(discount).sum();
    if ideal == 0.0 { 0.0 } else { dcg / ideal }
}

fn discount(position: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let pos = position as f64;
    1.0 / (pos + 2.0).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[&str]) -> Vec<Document> {
        ids.iter().map(|id| Document::new(*id)).collect()
    }

    fn evaluator(cutoffs: &[usize]) -> Evaluator {
        Evaluator::new(PageScheme::PagesSuffix { offset: 0 }, cutoffs.to_vec()).unwrap()
    }

    #[test]
    fn match_at_five_but_not_at_two() {
        let expected = ExpectedPages::parse("121").unwrap();
        let retrieved = docs(&["a_pages_120", "b_pages_130", "c_pages_121"]);
        let results = evaluator(&[2, 5]).score(&expected, &retrieved);

        assert_eq!(results[0].k, 2);
        assert_eq!(results[0].pages, vec!["120", "130"]);
        assert!(!results[0].matched);

        assert_eq!(results[1].pages, vec!["120", "130", "121"]);
        assert!(results[1].matched);
    }

    #[test]
    fn pageless_ids_hold_their_position() {
        let expected = ExpectedPages::parse("9").unwrap();
        let retrieved = docs(&["no-page", "x_pages_9"]);
        let results = evaluator(&[1, 2]).score(&expected, &retrieved);
        assert!(results[0].pages.is_empty());
        assert!(!results[0].matched);
        assert!(results[1].matched);
    }

    #[test]
    fn one_based_scheme_shifts_pages() {
        let e = Evaluator::new(PageScheme::default(), vec![1]).unwrap();
        let expected = ExpectedPages::parse("121.0").unwrap();
        let results = e.score(&expected, &docs(&["doc_pages_120"]));
        assert!(results[0].matched);
    }

    #[test]
    fn ndcg_perfect_and_partial() {
        let expected = ExpectedPages::parse("1, 2").unwrap();
        let perfect = vec!["1".to_string(), "2".to_string()];
        assert!((ndcg_at_k(&perfect, &expected, 5) - 1.0).abs() < 1e-9);

        let late = vec!["7".to_string(), "1".to_string()];
        let score = ndcg_at_k(&late, &expected, 5);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn ndcg_ignores_repeated_pages() {
        let expected = ExpectedPages::parse("1").unwrap();
        let repeated = vec!["1".to_string(), "1".to_string(), "1".to_string()];
        assert!((ndcg_at_k(&repeated, &expected, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_cutoffs_rejected() {
        assert!(Evaluator::new(PageScheme::default(), vec![10, 5]).is_err());
        assert!(Evaluator::new(PageScheme::default(), vec![]).is_err());
    }

    #[test]
    fn evaluate_builds_record() {
        let e = evaluator(&[5]);
        let record = e.evaluate(
            QueryKey::for_text("q"),
            Some(4),
            "q",
            ExpectedPages::parse("3").unwrap(),
            &docs(&["z_pages_3"]),
            true,
        );
        assert_eq!(record.row, Some(4));
        assert!(record.degraded);
        assert_eq!(record.matched_at(5), Some(true));
    }
}
