//! Azure AI Search adapter for lexical (BM25), vector and service-side
//! hybrid retrieval.

use super::{classify, decode};
use hybench_core::config::{HitFields, ServicesConfig};
use hybench_core::model::{Document, RankedList};
use hybench_core::upstream::{Service, ServiceError};
use hybench_search::pipeline::Retriever;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

pub struct AzureSearch {
    agent: ureq::Agent,
    endpoint: String,
    index: String,
    api_key: String,
    api_version: String,
    vector_field: String,
    fields: HitFields,
}

impl AzureSearch {
    #[must_use]
    pub fn new(
        agent: ureq::Agent,
        endpoint: String,
        index: String,
        api_key: String,
        services: &ServicesConfig,
    ) -> Self {
        Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index,
            api_key,
            api_version: services.search_api_version.clone(),
            vector_field: services.vector_field.clone(),
            fields: services.fields.clone(),
        }
    }

    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}/indexes/{}/docs/search", self.endpoint, self.index)
    }

    fn select(&self) -> String {
        [&self.fields.id, &self.fields.title, &self.fields.text].map(String::as_str).join(",")
    }

    fn lexical_body(&self, query: &str, fields: &[String], top_k: usize) -> Value {
        json!({
            "search": query,
            "queryType": "simple",
            "searchFields": fields.join(","),
            "select": self.select(),
            "top": top_k,
        })
    }

    fn vector_body(&self, vector: &[f32], top_k: usize) -> Value {
        json!({
            "select": self.select(),
            "top": top_k,
            "vectorQueries": [{
                "kind": "vector",
                "vector": vector,
                "fields": self.vector_field,
                "k": top_k,
            }],
        })
    }

    /// Lexical and vector clauses in one request; the service merges them.
    fn hybrid_body(&self, query: &str, fields: &[String], vector: &[f32], top_k: usize) -> Value {
        let mut body = self.lexical_body(query, fields, top_k);
        let mut dense = self.vector_body(vector, top_k);
        body["vectorQueries"] = dense["vectorQueries"].take();
        body
    }

    fn post(&self, service: Service, body: &Value) -> Result<RankedList, ServiceError> {
        let response = self
            .agent
            .post(&self.search_url())
            .query("api-version", &self.api_version)
            .set("api-key", &self.api_key)
            .send_json(body)
            .map_err(|err| classify(service, err))?;
        let page: SearchResponse = decode(service, response)?;
        Ok(hits_to_list(&self.fields, page.value))
    }
}

impl Retriever for AzureSearch {
    fn search_lexical(
        &self,
        query: &str,
        fields: &[String],
        top_k: usize,
    ) -> Result<RankedList, ServiceError> {
        self.post(Service::LexicalSearch, &self.lexical_body(query, fields, top_k))
    }

    fn search_vector(&self, vector: &[f32], top_k: usize) -> Result<RankedList, ServiceError> {
        self.post(Service::VectorSearch, &self.vector_body(vector, top_k))
    }

    fn search_hybrid(
        &self,
        query: &str,
        fields: &[String],
        vector: &[f32],
        top_k: usize,
    ) -> Result<RankedList, ServiceError> {
        self.post(
            Service::HybridSearch,
            &self.hybrid_body(query, fields, vector, top_k),
        )
    }
}

/// Map raw hits to documents. Hits without an id are dropped.
fn hits_to_list(fields: &HitFields, hits: Vec<Map<String, Value>>) -> RankedList {
    hits.into_iter()
        .filter_map(|hit| {
            let Some(id) = hit.get(&fields.id).and_then(Value::as_str) else {
                debug!(field = %fields.id, "search hit without id dropped");
                return None;
            };
            let mut doc = Document::new(id);
            doc.title = hit.get(&fields.title).and_then(Value::as_str).map(str::to_string);
            doc.text = hit.get(&fields.text).and_then(Value::as_str).map(str::to_string);
            doc.score = hit.get(&fields.score).and_then(Value::as_f64);
            Some(doc)
        })
        .collect()
}
