use super::{classify, decode};
use hybench_core::config::ServicesConfig;
use hybench_core::upstream::{Service, ServiceError};
use hybench_search::pipeline::Embedder;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Azure OpenAI embeddings deployment.
pub struct AzureOpenAiEmbedder {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiEmbedder {
    #[must_use]
    pub fn new(
        agent: ureq::Agent,
        endpoint: String,
        api_key: String,
        services: &ServicesConfig,
    ) -> Self {
        Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment: services.embedding_deployment.clone(),
            api_version: services.openai_api_version.clone(),
        }
    }

    #[must_use]
    pub fn embeddings_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings",
            self.endpoint, self.deployment
        )
    }
}

impl Embedder for AzureOpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let response = self
            .agent
            .post(&self.embeddings_url())
            .query("api-version", &self.api_version)
            .set("api-key", &self.api_key)
            .send_json(json!({ "input": text }))
            .map_err(|err| classify(Service::Embedding, err))?;
        first_embedding(decode(Service::Embedding, response)?)
    }
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, ServiceError> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::Malformed {
            service: Service::Embedding,
            message: "response carried no embedding".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_names_the_deployment() {
        let client = AzureOpenAiEmbedder::new(
            ureq::agent(),
            "https://acme.openai.azure.com/".into(),
            "k".into(),
            &ServicesConfig::default(),
        );
        assert_eq!(
            client.embeddings_url(),
            "https://acme.openai.azure.com/openai/deployments/text-embedding-3-large/embeddings"
        );
    }

    #[test]
    fn first_vector_is_used() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "data": [{"embedding": [0.1, 0.2]}, {"embedding": [9.0]}]
        }))
        .unwrap();
        assert_eq!(first_embedding(response).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn missing_vector_is_malformed() {
        let response: EmbeddingResponse = serde_json::from_value(json!({"data": []})).unwrap();
        let err = first_embedding(response).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
        assert!(err.is_retryable());
    }
}
