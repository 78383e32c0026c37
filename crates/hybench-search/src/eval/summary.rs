use hybench_core::model::EvaluationRecord;
use hybench_core::report::AccuracyRow;
use serde::Serialize;

/// Accuracy and mean NDCG at one cutoff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutoffAccuracy {
    pub k: usize,
    pub matches: usize,
    /// `matches / evaluated`, 0.0 when nothing was evaluated.
    pub accuracy: f64,
    pub mean_ndcg: f64,
}

/// Batch-level accuracy with the counts that qualify it.
///
/// Skipped and failed queries are outside the denominator; they are only
/// reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub cutoffs: Vec<CutoffAccuracy>,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Evaluated records whose rerank step fell back.
    pub degraded: usize,
}

impl AccuracySummary {
    /// Aggregate `records` at `cutoffs`.
    ///
    /// A record without a given cutoff counts as a miss there.
    #[must_use]
    pub fn from_records(
        records: &[EvaluationRecord],
        cutoffs: &[usize],
        skipped: usize,
        failed: usize,
    ) -> Self {
        let evaluated = records.len();
        let cutoffs = cutoffs
            .iter()
            .map(|&k| {
                let matches = records
                    .iter()
                    .filter(|r| r.matched_at(k).unwrap_or(false))
                    .count();
                let ndcg_sum: f64 = records
                    .iter()
                    .filter_map(|r| r.cutoff(k))
                    .map(|c| c.ndcg)
                    .sum();
                CutoffAccuracy {
                    k,
                    matches,
                    accuracy: ratio(matches, evaluated),
                    mean_ndcg: if evaluated == 0 {
                        0.0
                    } else {
                        ndcg_sum / as_f64(evaluated)
                    },
                }
            })
            .collect();

        Self {
            cutoffs,
            evaluated,
            skipped,
            failed,
            degraded: records.iter().filter(|r| r.degraded).count(),
        }
    }

    #[must_use]
    pub fn accuracy_at(&self, k: usize) -> Option<f64> {
        self.cutoffs.iter().find(|c| c.k == k).map(|c| c.accuracy)
    }

    /// Row for the accuracy CSV.
    #[must_use]
    pub fn to_row(&self) -> AccuracyRow {
        AccuracyRow {
            accuracy: self.cutoffs.iter().map(|c| (c.k, c.accuracy)).collect(),
            evaluated: self.evaluated,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        as_f64(part) / as_f64(whole)
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: usize) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hybench_core::model::{CutoffResult, ExpectedPages, QueryKey};

    fn record(id: usize, flags: &[(usize, bool)]) -> EvaluationRecord {
        EvaluationRecord {
            key: QueryKey::for_row("d", id),
            row: Some(id),
            query: format!("q{id}"),
            expected: ExpectedPages::from_tokens(["1"]),
            cutoffs: flags
                .iter()
                .map(|&(k, matched)| CutoffResult {
                    k,
                    pages: Vec::new(),
                    matched,
                    ndcg: if matched { 1.0 } else { 0.0 },
                })
                .collect(),
            degraded: id == 0,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn accuracy_is_a_plain_proportion() {
        let records = vec![
            record(0, &[(5, true), (10, true)]),
            record(1, &[(5, false), (10, true)]),
            record(2, &[(5, false), (10, false)]),
            record(3, &[(5, false), (10, true)]),
        ];
        let summary = AccuracySummary::from_records(&records, &[5, 10], 2, 1);
        assert_eq!(summary.accuracy_at(5), Some(0.25));
        assert_eq!(summary.accuracy_at(10), Some(0.75));
        assert_eq!(summary.evaluated, 4);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.degraded, 1);
        assert!((summary.cutoffs[1].mean_ndcg - 0.75).abs() < 1e-9);
    }

    #[test]
    fn nothing_evaluated_reports_zero() {
        let summary = AccuracySummary::from_records(&[], &[5, 10, 25], 3, 0);
        assert_eq!(summary.accuracy_at(25), Some(0.0));
        assert_eq!(summary.evaluated, 0);
        let row = summary.to_row();
        assert_eq!(row.accuracy, vec![(5, 0.0), (10, 0.0), (25, 0.0)]);
        assert_eq!(row.skipped, 3);
    }

    #[test]
    fn missing_cutoff_counts_as_miss() {
        let summary = AccuracySummary::from_records(&[record(1, &[(5, true)])], &[5, 10], 0, 0);
        assert_eq!(summary.accuracy_at(5), Some(1.0));
        assert_eq!(summary.accuracy_at(10), Some(0.0));
    }
}
