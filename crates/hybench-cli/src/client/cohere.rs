use super::{classify, decode};
use hybench_core::upstream::{Service, ServiceError};
use hybench_search::rerank::{RelevanceModel, RerankHit};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Cohere `/v1/rerank` client.
pub struct CohereReranker {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
}

impl CohereReranker {
    #[must_use]
    pub fn new(agent: ureq::Agent, base_url: String, api_key: String, model: String) -> Self {
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

impl RelevanceModel for CohereReranker {
    fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError> {
        let response = self
            .agent
            .post(&format!("{}/v1/rerank", self.base_url))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(json!({
                "model": self.model,
                "query": query,
                "documents": documents,
                "top_n": top_n,
            }))
            .map_err(|err| classify(Service::Rerank, err))?;
        let body: RerankResponse = decode(Service::Rerank, response)?;
        Ok(into_hits(body))
    }
}

fn into_hits(body: RerankResponse) -> Vec<RerankHit> {
    body.results
        .into_iter()
        .map(|r| RerankHit {
            index: r.index,
            relevance_score: r.relevance_score,
        })
        .collect()
}
