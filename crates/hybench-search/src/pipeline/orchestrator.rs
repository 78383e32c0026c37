//! Batch evaluation driver.
//!
//! Each query runs retrieval, fusion, optional rerank and scoring under a
//! [`QueryTracker`]. The cancel token is polled before every transition and
//! inside every sleep. A query interrupted mid-flight is abandoned and never
//! persisted, so the next run picks it up again.
//!
//! Failure handling per step:
//!
//! | Cause                              | Terminal state |
//! |------------------------------------|----------------|
//! | ground truth missing or empty      | `SKIPPED`      |
//! | upstream rejected the request      | `SKIPPED`      |
//! | retries exhausted                  | `FAILED`       |
//! | illegal transition (internal bug)  | `FAILED`       |
//! | rerank unavailable                 | none, fused order is scored as `degraded` |
//!
//! Only `PERSISTED` queries are written to the checkpoint.

use super::services::{Embedder, Retriever};
use super::state::{QueryState, QueryTracker, TransitionError};
use crate::eval::Evaluator;
use crate::fusion::{FusedDocument, fuse_documents, prefilter};
use crate::rerank::{RelevanceModel, RerankOutcome, Reranker};
use hybench_core::checkpoint::{CheckpointError, CheckpointStore};
use hybench_core::config::{ConfigError, ResumeKey, RunConfig};
use hybench_core::dataset::Dataset;
use hybench_core::model::{Document, EvaluationRecord, ExpectedPages, QueryKey, RankedList};
use hybench_core::rate_limit::Pacer;
use hybench_core::retry::{RetryError, call_with_retry};
use hybench_core::upstream::Service;
use serde::Serialize;
use tracing::{error, info, warn};

/// External services used by a run. Only the ones the mode needs are required.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub retriever: &'a dyn Retriever,
    pub embedder: Option<&'a dyn Embedder>,
    pub relevance: Option<&'a dyn RelevanceModel>,
}

/// One dataset query ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryItem {
    pub key: QueryKey,
    pub row: Option<usize>,
    pub query: String,
    pub pages_raw: String,
}

impl QueryItem {
    /// Items for every dataset row, keyed by `key`.
    #[must_use]
    pub fn from_dataset(dataset: &Dataset, key: ResumeKey) -> Vec<Self> {
        dataset
            .rows
            .iter()
            .map(|row| Self {
                key: match key {
                    ResumeKey::Row => QueryKey::for_row(&dataset.name, row.row),
                    ResumeKey::QueryText => QueryKey::for_text(&row.query),
                },
                row: Some(row.row),
                query: row.query.clone(),
                pages_raw: row.pages_raw.clone(),
            })
            .collect()
    }
}

/// Final ranking for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub fused: Vec<FusedDocument>,
    /// Present when reranking is enabled.
    pub reranked: Option<RerankOutcome>,
}

impl Ranking {
    /// Documents in final order: reranked if present, otherwise fused.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.reranked.as_ref().map_or_else(
            || self.fused.iter().map(|f| f.document.clone()).collect(),
            |r| r.documents.iter().map(|d| d.document.clone()).collect(),
        )
    }

    #[must_use]
    pub fn degraded(&self) -> bool {
        self.reranked.as_ref().is_some_and(|r| r.degraded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Scored(EvaluationRecord),
    Skipped { reason: String },
    Failed { reason: String },
    Interrupted,
}

/// Outcome of one query plus the states it went through.
#[derive(Debug, Clone)]
pub struct QueryRun {
    pub tracker: QueryTracker,
    pub outcome: QueryOutcome,
}

/// A query that did not reach `PERSISTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryIssue {
    pub key: QueryKey,
    pub row: Option<usize>,
    pub query: String,
    pub state: QueryState,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Queries persisted by this run.
    pub evaluated: usize,
    /// Queries already present in the checkpoint.
    pub resumed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The run stopped on a cancel request.
    pub interrupted: bool,
    /// Queries not attempted because of the interrupt.
    pub remaining: usize,
    pub issues: Vec<QueryIssue>,
}

/// Why a pipeline step stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    Skip(String),
    Fail(String),
    Interrupted,
    Internal(TransitionError),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip(reason) | Self::Fail(reason) => f.write_str(reason),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StepError {}

impl From<TransitionError> for StepError {
    fn from(err: TransitionError) -> Self {
        Self::Internal(err)
    }
}

impl From<RetryError> for StepError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled(_) => Self::Interrupted,
            RetryError::Permanent(_) => Self::Skip(err.to_string()),
            RetryError::Exhausted { .. } => Self::Fail(err.to_string()),
        }
    }
}

pub struct Orchestrator<'a> {
    config: &'a RunConfig,
    services: Services<'a>,
    evaluator: Evaluator,
    pacer: Pacer,
}

impl<'a> Orchestrator<'a> {
    /// # Errors
    ///
    /// Invalid configuration, or a service the configured mode needs is
    /// missing.
    pub fn new(config: &'a RunConfig, services: Services<'a>, pacer: Pacer) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.retrieval.mode.uses_vector() && services.embedder.is_none() {
            return Err(ConfigError::Invalid {
                key: "retrieval.mode",
                reason: format!("mode '{}' needs an embedding service", config.retrieval.mode),
            });
        }
        if config.rerank.enabled && services.relevance.is_none() {
            return Err(ConfigError::Invalid {
                key: "rerank.enabled",
                reason: "reranking needs a relevance model".into(),
            });
        }
        let evaluator = Evaluator::new(config.eval.page, config.eval.cutoffs.clone())?;
        Ok(Self {
            config,
            services,
            evaluator,
            pacer,
        })
    }

    #[must_use]
    pub const fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Run one free-text query through retrieval, fusion and rerank.
    ///
    /// # Errors
    ///
    /// The step that stopped the query.
    pub fn search(&mut self, query: &str) -> Result<Ranking, StepError> {
        let mut tracker = QueryTracker::new(QueryKey::for_text(query));
        self.rank(&mut tracker, query)
    }

    /// Run one dataset query up to `SCORED`.
    pub fn evaluate_query(&mut self, item: &QueryItem) -> QueryRun {
        let mut tracker = QueryTracker::new(item.key.clone());
        let outcome = match self.score_query(&mut tracker, item) {
            Ok(record) => QueryOutcome::Scored(record),
            Err(StepError::Interrupted) => QueryOutcome::Interrupted,
            Err(StepError::Skip(reason)) => {
                self.finish(&mut tracker, QueryState::Skipped);
                QueryOutcome::Skipped { reason }
            }
            Err(StepError::Fail(reason)) => {
                self.finish(&mut tracker, QueryState::Failed);
                QueryOutcome::Failed { reason }
            }
            Err(StepError::Internal(err)) => {
                error!(key = %item.key, error = %err, "query state machine error");
                QueryOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        QueryRun { tracker, outcome }
    }

    /// Evaluate every item not already in `store`, persisting each success.
    /// A stored record whose question differs from the item's is stale and
    /// the item is evaluated again.
    ///
    /// # Errors
    ///
    /// Only a checkpoint write failure aborts the batch.
    pub fn run_batch(
        &mut self,
        items: &[QueryItem],
        store: &mut CheckpointStore,
    ) -> Result<BatchOutcome, CheckpointError> {
        let mut outcome = BatchOutcome::default();
        let total = items.len();

        for (idx, item) in items.iter().enumerate() {
            if self.pacer.cancel_token().is_cancelled() {
                outcome.interrupted = true;
                outcome.remaining = total - idx;
                break;
            }
            if let Some(stored) = store.get(&item.key) {
                if stored.query == item.query {
                    outcome.resumed += 1;
                    continue;
                }
                warn!(
                    key = %item.key,
                    row = ?item.row,
                    stored = %stored.query,
                    "checkpoint record belongs to a different question, re-evaluating"
                );
            }

            let mut run = self.evaluate_query(item);
            match run.outcome {
                QueryOutcome::Scored(record) => {
                    store.append(&record)?;
                    if let Err(err) = run.tracker.advance(QueryState::Persisted) {
                        error!(key = %item.key, error = %err, "query state machine error");
                    }
                    outcome.evaluated += 1;
                    info!(
                        progress = %format!("{}/{total}", idx + 1),
                        row = ?item.row,
                        matched = ?record.cutoffs.iter().map(|c| (c.k, c.matched)).collect::<Vec<_>>(),
                        degraded = record.degraded,
                        "query evaluated"
                    );
                }
                QueryOutcome::Skipped { reason } => {
                    warn!(progress = %format!("{}/{total}", idx + 1), row = ?item.row, %reason, "query skipped");
                    outcome.skipped += 1;
                    outcome.issues.push(issue(item, QueryState::Skipped, reason));
                }
                QueryOutcome::Failed { reason } => {
                    error!(progress = %format!("{}/{total}", idx + 1), row = ?item.row, %reason, "query failed");
                    outcome.failed += 1;
                    outcome.issues.push(issue(item, QueryState::Failed, reason));
                }
                QueryOutcome::Interrupted => {
                    warn!(row = ?item.row, "interrupted, in-flight query abandoned");
                    outcome.interrupted = true;
                    outcome.remaining = total - idx;
                    break;
                }
            }
        }

        info!(
            evaluated = outcome.evaluated,
            resumed = outcome.resumed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            interrupted = outcome.interrupted,
            "batch finished"
        );
        Ok(outcome)
    }

    fn score_query(
        &mut self,
        tracker: &mut QueryTracker,
        item: &QueryItem,
    ) -> Result<EvaluationRecord, StepError> {
        let expected = ExpectedPages::parse(&item.pages_raw)
            .map_err(|err| StepError::Skip(format!("missing ground truth: {err}")))?;
        let ranking = self.rank(tracker, &item.query)?;

        self.step(tracker, QueryState::Scored)?;
        Ok(self.evaluator.evaluate(
            item.key.clone(),
            item.row,
            &item.query,
            expected,
            &ranking.documents(),
            ranking.degraded(),
        ))
    }

    fn rank(&mut self, tracker: &mut QueryTracker, query: &str) -> Result<Ranking, StepError> {
        let config = self.config;
        let mode = config.retrieval.mode;

        self.step(tracker, QueryState::Embedding)?;
        let vector = match self.services.embedder {
            Some(embedder) if mode.uses_vector() => Some(call_with_retry(
                &config.retry,
                &mut self.pacer,
                Service::Embedding,
                || embedder.embed(query),
            )?),
            _ => None,
        };

        self.step(tracker, QueryState::Retrieving)?;
        let retriever = self.services.retriever;
        let fields = &config.retrieval.lexical_fields;
        let top_k = config.retrieval.top_k;
        let mut lists: Vec<RankedList> = Vec::with_capacity(2);
        match vector.as_deref() {
            // one list in, so fusion below keeps the service's order
            Some(vector) if mode.is_service_fused() => {
                lists.push(call_with_retry(
                    &config.retry,
                    &mut self.pacer,
                    Service::HybridSearch,
                    || retriever.search_hybrid(query, fields, vector, top_k),
                )?);
            }
            vector => {
                if mode.uses_lexical() {
                    lists.push(call_with_retry(
                        &config.retry,
                        &mut self.pacer,
                        Service::LexicalSearch,
                        || retriever.search_lexical(query, fields, top_k),
                    )?);
                }
                if let Some(vector) = vector {
                    lists.push(call_with_retry(
                        &config.retry,
                        &mut self.pacer,
                        Service::VectorSearch,
                        || retriever.search_vector(vector, top_k),
                    )?);
                }
            }
        }

        self.step(tracker, QueryState::Fusing)?;
        let lists = prefilter(lists, config.fusion.min_text_chars);
        let fused = fuse_documents(&lists, config.fusion.rrf_k);

        let reranked = match self.services.relevance {
            Some(model) if config.rerank.enabled => {
                self.step(tracker, QueryState::Reranking)?;
                let candidates: Vec<Document> = fused
                    .iter()
                    .filter(|f| f.document.has_text())
                    .take(config.rerank.max_candidates)
                    .map(|f| f.document.clone())
                    .collect();
                let outcome = Reranker::new(model, config.retry.clone()).rerank(
                    query,
                    &candidates,
                    config.rerank_top_n(),
                    &mut self.pacer,
                );
                if self.pacer.cancel_token().is_cancelled() {
                    return Err(StepError::Interrupted);
                }
                Some(outcome)
            }
            _ => None,
        };

        Ok(Ranking { fused, reranked })
    }

    /// Cancel check plus checked transition.
    fn step(&self, tracker: &mut QueryTracker, next: QueryState) -> Result<(), StepError> {
        if self.pacer.cancel_token().is_cancelled() {
            return Err(StepError::Interrupted);
        }
        tracker.advance(next)?;
        Ok(())
    }

    fn finish(&self, tracker: &mut QueryTracker, terminal: QueryState) {
        if let Err(err) = tracker.advance(terminal) {
            error!(key = %tracker.key(), error = %err, "query state machine error");
        }
    }
}

fn issue(item: &QueryItem, state: QueryState, reason: String) -> QueryIssue {
    QueryIssue {
        key: item.key.clone(),
        row: item.row,
        query: item.query.clone(),
        state,
        reason,
    }
}
