//! Blocking HTTP adapters for the hosted services.
//!
//! Each adapter implements one of the pipeline seams and reports failures as
//! [`ServiceError`]; retries, cooldown and timing are applied by the caller.

pub mod azure_search;
pub mod cohere;
pub mod openai;

pub use azure_search::AzureSearch;
pub use cohere::CohereReranker;
pub use openai::AzureOpenAiEmbedder;

use hybench_core::config::{
    ConfigError, Credentials, ENV_COHERE_KEY, ENV_OPENAI_ENDPOINT, ENV_OPENAI_KEY, ENV_SEARCH_INDEX,
    ENV_SEARCH_KEY, ENV_SEARCH_SERVICE, RunConfig,
};
use hybench_core::upstream::{Service, ServiceError};
use hybench_search::pipeline::{Embedder, Services};
use hybench_search::rerank::RelevanceModel;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest error body kept in a [`ServiceError`] message.
const MAX_BODY_CHARS: usize = 300;

#[must_use]
pub fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("hybench/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Map a transport or status failure onto the service taxonomy.
pub fn classify(service: Service, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(status, response) => {
            let retry_after = parse_retry_after(response.header("Retry-After"));
            let body = truncate(&response.into_string().unwrap_or_default());
            match ServiceError::from_status(service, status, body) {
                ServiceError::RateLimited {
                    service, status, ..
                } => ServiceError::RateLimited {
                    service,
                    status,
                    retry_after,
                },
                other => other,
            }
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if message.contains("timed out") {
                ServiceError::Timeout { service, message }
            } else {
                ServiceError::Transport { service, message }
            }
        }
    }
}

/// Decode a JSON body, treating any mismatch as a malformed response.
pub fn decode<T: DeserializeOwned>(
    service: Service,
    response: ureq::Response,
) -> Result<T, ServiceError> {
    response
        .into_json::<T>()
        .map_err(|err| ServiceError::Malformed {
            service,
            message: err.to_string(),
        })
}

/// `Retry-After` in delta-seconds. HTTP dates are ignored.
fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
        format!("{cut}...")
    }
}

/// Adapters for every service the configured pipeline uses.
pub struct Clients {
    pub search: AzureSearch,
    pub embedder: Option<AzureOpenAiEmbedder>,
    pub reranker: Option<CohereReranker>,
}

impl Clients {
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] when a needed variable is unset.
    pub fn from_config(config: &RunConfig, creds: &Credentials) -> Result<Self, ConfigError> {
        creds.require_for(config)?;
        let agent = agent(config.services.timeout_secs);
        let services = &config.services;

        let endpoint = match (&services.search_endpoint, &creds.search_service) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(name)) => format!("https://{name}.search.windows.net"),
            (None, None) => return Err(missing(ENV_SEARCH_SERVICE)),
        };
        let search = AzureSearch::new(
            agent.clone(),
            endpoint,
            required(creds.search_index.as_ref(), ENV_SEARCH_INDEX)?,
            required(creds.search_key.as_ref(), ENV_SEARCH_KEY)?,
            services,
        );

        let embedder = if config.retrieval.mode.uses_vector() {
            Some(AzureOpenAiEmbedder::new(
                agent.clone(),
                required(
                    creds.openai_endpoint.as_ref(),
                    ENV_OPENAI_ENDPOINT,
                )?,
                required(creds.openai_key.as_ref(), ENV_OPENAI_KEY)?,
                services,
            ))
        } else {
            None
        };

        let reranker = if config.rerank.enabled {
            Some(CohereReranker::new(
                agent,
                services.rerank_base_url.clone(),
                required(creds.cohere_key.as_ref(), ENV_COHERE_KEY)?,
                config.rerank.model.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            search,
            embedder,
            reranker,
        })
    }

    #[must_use]
    pub fn services(&self) -> Services<'_> {
        Services {
            retriever: &self.search,
            embedder: self
                .embedder
                .as_ref()
                .map(|e| e as &dyn Embedder),
            relevance: self
                .reranker
                .as_ref()
                .map(|r| r as &dyn RelevanceModel),
        }
    }
}

fn required(value: Option<&String>, var: &'static str) -> Result<String, ConfigError> {
    value.cloned().ok_or_else(|| missing(var))
}

fn missing(var: &'static str) -> ConfigError {
    ConfigError::MissingCredential { vars: vec![var] }
}
