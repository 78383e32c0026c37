//! In-process doubles for the external services.

#![allow(dead_code)]

use hybench_core::cancel::CancelToken;
use hybench_core::config::{RetrievalMode, RunConfig};
use hybench_core::model::{Document, RankedList};
use hybench_core::rate_limit::{Pacer, RateLimit, RecordingSleeper};
use hybench_core::retry::RetryPolicy;
use hybench_core::upstream::{Service, ServiceError};
use hybench_search::pipeline::{Embedder, QueryItem, Retriever};
use hybench_search::rerank::{RelevanceModel, RerankHit};
use hybench_core::model::QueryKey;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub fn doc(id: &str) -> Document {
    Document::new(id).with_text(format!("text of {id}"))
}

/// Search index keyed by query text. Vector search is keyed through the
/// embedding, which encodes the query's registration order.
#[derive(Default)]
pub struct FakeIndex {
    queries: RefCell<Vec<String>>,
    lexical: RefCell<HashMap<String, Vec<Document>>>,
    vector: RefCell<HashMap<String, Vec<Document>>>,
    hybrid: RefCell<HashMap<String, Vec<Document>>>,
    lexical_failures: RefCell<HashMap<String, ServiceError>>,
    pub lexical_calls: Cell<usize>,
    pub vector_calls: Cell<usize>,
    pub hybrid_calls: Cell<usize>,
    pub embed_calls: Cell<usize>,
    /// Fire this token during the n-th lexical call (1-based).
    cancel_on_call: RefCell<Option<(usize, CancelToken)>>,
}

impl FakeIndex {
    pub fn add(&self, query: &str, lexical: &[&str], vector: &[&str]) {
        self.queries.borrow_mut().push(query.to_string());
        self.lexical
            .borrow_mut()
            .insert(query.to_string(), lexical.iter().map(|id| doc(id)).collect());
        self.vector
            .borrow_mut()
            .insert(query.to_string(), vector.iter().map(|id| doc(id)).collect());
    }

    /// Ranking the index itself returns for a combined text and vector query.
    pub fn add_hybrid(&self, query: &str, ids: &[&str]) {
        self.hybrid
            .borrow_mut()
            .insert(query.to_string(), ids.iter().map(|id| doc(id)).collect());
    }

    pub fn fail_lexical(&self, query: &str, err: ServiceError) {
        self.lexical_failures
            .borrow_mut()
            .insert(query.to_string(), err);
    }

    pub fn cancel_during_call(&self, n: usize, token: CancelToken) {
        *self.cancel_on_call.borrow_mut() = Some((n, token));
    }

    fn query_index(&self, query: &str) -> Option<usize> {
        self.queries.borrow().iter().position(|q| q == query)
    }
}

impl Retriever for FakeIndex {
    fn search_lexical(
        &self,
        query: &str,
        _fields: &[String],
        top_k: usize,
    ) -> Result<RankedList, ServiceError> {
        self.lexical_calls.set(self.lexical_calls.get() + 1);
        if let Some((n, token)) = self.cancel_on_call.borrow().as_ref() {
            if *n == self.lexical_calls.get() {
                token.cancel();
            }
        }
        if let Some(err) = self.lexical_failures.borrow().get(query) {
            return Err(err.clone());
        }
        let docs = self.lexical.borrow().get(query).cloned().unwrap_or_default();
        Ok(RankedList::from_documents(docs).truncated(top_k))
    }

    fn search_vector(&self, vector: &[f32], top_k: usize) -> Result<RankedList, ServiceError> {
        self.vector_calls.set(self.vector_calls.get() + 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = vector.first().copied().unwrap_or(f32::MAX) as usize;
        let query = self.queries.borrow().get(idx).cloned();
        let docs = query
            .and_then(|q| self.vector.borrow().get(&q).cloned())
            .unwrap_or_default();
        Ok(RankedList::from_documents(docs).truncated(top_k))
    }

    fn search_hybrid(
        &self,
        query: &str,
        _fields: &[String],
        vector: &[f32],
        top_k: usize,
    ) -> Result<RankedList, ServiceError> {
        self.hybrid_calls.set(self.hybrid_calls.get() + 1);
        #[allow(clippy::cast_precision_loss)]
        let expected = self.query_index(query).map_or(f32::MAX, |i| i as f32);
        assert_eq!(vector.first().copied(), Some(expected), "vector must embed the query");
        let docs = self.hybrid.borrow().get(query).cloned().unwrap_or_default();
        Ok(RankedList::from_documents(docs).truncated(top_k))
    }
}

impl Embedder for FakeIndex {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.embed_calls.set(self.embed_calls.get() + 1);
        #[allow(clippy::cast_precision_loss)]
        let idx = self.query_index(text).map_or(f32::MAX, |i| i as f32);
        Ok(vec![idx, 0.0, 0.0])
    }
}

/// Relevance model that reverses the candidates, or always fails.
pub struct FakeReranker {
    pub fail_with: Option<ServiceError>,
    pub calls: Cell<usize>,
}

impl FakeReranker {
    pub fn reversing() -> Self {
        Self {
            fail_with: None,
            calls: Cell::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_with: Some(ServiceError::Timeout {
                service: Service::Rerank,
                message: "deadline exceeded".into(),
            }),
            calls: Cell::new(0),
        }
    }
}

impl RelevanceModel for FakeReranker {
    fn rerank(
        &self,
        _query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        #[allow(clippy::cast_precision_loss)]
        let hits = (0..documents.len())
            .rev()
            .take(top_n)
            .enumerate()
            .map(|(pos, index)| RerankHit {
                index,
                relevance_score: 1.0 / (pos as f64 + 1.0),
            })
            .collect();
        Ok(hits)
    }
}

pub fn quiet_pacer(cancel: CancelToken) -> Pacer {
    Pacer::seeded(
        RateLimit {
            cooldown_ms: 0,
            jitter_ms: 0,
        },
        Box::new(RecordingSleeper::new()),
        cancel,
        11,
    )
}

pub fn config(mode: RetrievalMode, rerank: bool) -> RunConfig {
    let mut config = RunConfig::default();
    config.retrieval.mode = mode;
    config.rerank.enabled = rerank;
    config.retry = RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 0,
        jitter_ms: 0,
        ..RetryPolicy::default()
    };
    config
}

pub fn item(row: usize, query: &str, pages: &str) -> QueryItem {
    QueryItem {
        key: QueryKey::for_row("fixture.csv", row),
        row: Some(row),
        query: query.to_string(),
        pages_raw: pages.to_string(),
    }
}
