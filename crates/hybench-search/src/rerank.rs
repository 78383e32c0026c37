//! Reranker adapter with fail-open fallback.
//!
//! The relevance model sees candidate texts in a fixed order and answers
//! with indices into that order. The adapter maps indices back to documents,
//! discarding anything out of range or repeated, so the output is always a
//! (possibly truncated) permutation of the input.
//!
//! A failing model never fails the pipeline: after retries are exhausted, or
//! on a non-retryable rejection, the candidates come back in their original
//! order truncated to `top_n`, flagged `degraded`.

use hybench_core::model::Document;
use hybench_core::rate_limit::Pacer;
use hybench_core::retry::{RetryError, RetryPolicy, call_with_retry};
use hybench_core::upstream::{Service, ServiceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One scored index returned by a relevance model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f64,
}

/// External cross-encoder scoring.
pub trait RelevanceModel {
    /// Score `documents` against `query`, best first, at most `top_n` hits.
    ///
    /// # Errors
    ///
    /// Any transport, quota, or decoding failure.
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError>;
}

/// A reranked document with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedDocument {
    pub document: Document,
    /// Position in the candidate list handed to the reranker.
    pub original_index: usize,
    /// `None` when this entry comes from the fallback path.
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankOutcome {
    pub documents: Vec<RerankedDocument>,
    /// True when the model could not be used and the fallback order was returned.
    pub degraded: bool,
    /// Indices the model returned that were out of range or repeated.
    pub discarded: usize,
}

impl RerankOutcome {
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.documents.into_iter().map(|r| r.document).collect()
    }
}

/// Wraps a [`RelevanceModel`] with the run's retry policy.
pub struct Reranker<'a> {
    model: &'a dyn RelevanceModel,
    policy: RetryPolicy,
}

impl<'a> Reranker<'a> {
    #[must_use]
    pub fn new(model: &'a dyn RelevanceModel, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    /// Rerank `candidates` for `query`, keeping at most `top_n`.
    ///
    /// Never fails. Empty candidates return an empty outcome without calling
    /// the model.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[Document],
        top_n: usize,
        pacer: &mut Pacer,
    ) -> RerankOutcome {
        if candidates.is_empty() || top_n == 0 {
            return RerankOutcome {
                documents: Vec::new(),
                degraded: false,
                discarded: 0,
            };
        }

        let texts: Vec<&str> = candidates
            .iter()
            .map(|d| d.text.as_deref().unwrap_or_default())
            .collect();

        let result = call_with_retry(&self.policy, pacer, Service::Rerank, || {
            self.model.rerank(query, &texts, top_n)
        });

        match result {
            Ok(hits) => map_hits(candidates, &hits, top_n),
            Err(err) => {
                match &err {
                    RetryError::Cancelled(_) => debug!("rerank cancelled, using fallback order"),
                    _ => warn!(error = %err, "rerank unavailable, using fused order"),
                }
                fallback(candidates, top_n)
            }
        }
    }
}

/// Translate model indices back to candidates.
#[must_use]
pub fn map_hits(candidates: &[Document], hits: &[RerankHit], top_n: usize) -> RerankOutcome {
    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(hits.len().min(top_n));
    let mut discarded = 0;

    for hit in hits {
        if documents.len() == top_n {
            break;
        }
        let Some(doc) = candidates.get(hit.index) else {
            warn!(index = hit.index, candidates = candidates.len(), "rerank index out of range");
            discarded += 1;
            continue;
        };
        if !seen.insert(hit.index) {
            debug!(index = hit.index, "rerank returned a repeated index");
            discarded += 1;
            continue;
        }
        documents.push(RerankedDocument {
            document: doc.clone(),
            original_index: hit.index,
            relevance_score: Some(hit.relevance_score),
        });
    }

    RerankOutcome {
        documents,
        degraded: false,
        discarded,
    }
}

/// Original order truncated to `top_n`, flagged degraded.
#[must_use]
pub fn fallback(candidates: &[Document], top_n: usize) -> RerankOutcome {
    RerankOutcome {
        documents: candidates
            .iter()
            .take(top_n)
            .enumerate()
            .map(|(idx, doc)| RerankedDocument {
                document: doc.clone(),
                original_index: idx,
                relevance_score: None,
            })
            .collect(),
        degraded: true,
        discarded: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybench_core::cancel::CancelToken;
    use hybench_core::rate_limit::{RateLimit, RecordingSleeper};
    use std::cell::Cell;

    struct Scripted {
        hits: Result<Vec<RerankHit>, ServiceError>,
        calls: Cell<usize>,
    }

    impl RelevanceModel for Scripted {
        fn rerank(&self, _: &str, _: &[&str], _: usize) -> Result<Vec<RerankHit>, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            self.hits.clone()
        }
    }

    fn hit(index: usize, relevance_score: f64) -> RerankHit {
        RerankHit {
            index,
            relevance_score,
        }
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("d{i}")).with_text(format!("text {i}")))
            .collect()
    }

    fn pacer() -> Pacer {
        Pacer::seeded(
            RateLimit {
                cooldown_ms: 0,
                jitter_ms: 0,
            },
            Box::new(RecordingSleeper::new()),
            CancelToken::new(),
            3,
        )
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            jitter_ms: 0,
            ..RetryPolicy::default()
        }
    }

    fn ids(outcome: &RerankOutcome) -> Vec<&str> {
        outcome.documents.iter().map(|r| r.document.id.as_str()).collect()
    }

    #[test]
    fn maps_indices_back_to_documents() {
        let model = Scripted {
            hits: Ok(vec![hit(2, 0.9), hit(0, 0.5), hit(1, 0.1)]),
            calls: Cell::new(0),
        };
        let out = Reranker::new(&model, policy()).rerank("q", &docs(3), 2, &mut pacer());
        assert_eq!(ids(&out), ["d2", "d0"]);
        assert_eq!(out.documents[0].original_index, 2);
        assert_eq!(out.documents[0].relevance_score, Some(0.9));
        assert!(!out.degraded);
    }

    #[test]
    fn drops_out_of_range_and_repeated_indices() {
        let out = map_hits(&docs(2), &[hit(5, 1.0), hit(1, 0.8), hit(1, 0.7), hit(0, 0.2)], 10);
        assert_eq!(ids(&out), ["d1", "d0"]);
        assert_eq!(out.discarded, 2);
    }

    #[test]
    fn fewer_results_than_requested_is_not_degraded() {
        let out = map_hits(&docs(5), &[hit(3, 0.4)], 5);
        assert_eq!(ids(&out), ["d3"]);
        assert!(!out.degraded);
    }

    #[test]
    fn failing_model_falls_back_to_input_order() {
        let model = Scripted {
            hits: Err(ServiceError::from_status(Service::Rerank, 503, "down")),
            calls: Cell::new(0),
        };
        let out = Reranker::new(&model, policy()).rerank("q", &docs(4), 3, &mut pacer());
        assert_eq!(model.calls.get(), 2);
        assert_eq!(ids(&out), ["d0", "d1", "d2"]);
        assert!(out.degraded);
        assert!(out.documents.iter().all(|r| r.relevance_score.is_none()));
    }

    #[test]
    fn rejected_request_falls_back_without_retry() {
        let model = Scripted {
            hits: Err(ServiceError::from_status(Service::Rerank, 401, "bad key")),
            calls: Cell::new(0),
        };
        let out = Reranker::new(&model, policy()).rerank("q", &docs(2), 5, &mut pacer());
        assert_eq!(model.calls.get(), 1);
        assert!(out.degraded);
        assert_eq!(ids(&out), ["d0", "d1"]);
    }

    #[test]
    fn empty_candidates_skip_the_call() {
        let model = Scripted {
            hits: Ok(vec![hit(0, 1.0)]),
            calls: Cell::new(0),
        };
        let out = Reranker::new(&model, policy()).rerank("q", &[], 5, &mut pacer());
        assert!(out.documents.is_empty());
        assert!(!out.degraded);
        assert_eq!(model.calls.get(), 0);
    }
}
