//! Run configuration.
//!
//! `RunConfig` is assembled once per run from up to two TOML layers and then
//! treated as read-only:
//!
//! 1. user file: `dirs::config_dir()/hybench/config.toml`
//! 2. project file: `hybench.toml` in the working directory, or `--config`
//!
//! Later layers override earlier ones key by key (tables merge, scalars and
//! arrays replace). CLI flags are applied last through [`Overrides`].
//! Credentials never live in files; see [`Credentials`].

use crate::error::ErrorCode;
use crate::page::PageScheme;
use crate::rate_limit::RateLimit;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PROJECT_FILE: &str = "hybench.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid cutoffs {cutoffs:?}: {reason}")]
    InvalidCutoffs { cutoffs: Vec<usize>, reason: String },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("missing environment variable(s): {}", .vars.join(", "))]
    MissingCredential { vars: Vec<&'static str> },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } | Self::Invalid { .. } => {
                ErrorCode::ConfigParseError
            }
            Self::InvalidCutoffs { .. } => ErrorCode::InvalidCutoffs,
            Self::MissingCredential { .. } => ErrorCode::MissingCredential,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    /// Drop hits whose text is missing or not longer than this. Unset = keep all.
    #[serde(default)]
    pub min_text_chars: Option<usize>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            min_text_chars: None,
        }
    }
}

/// Which retrieval signals feed the ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMode {
    Lexical,
    Vector,
    #[default]
    Hybrid,
    /// Text and vector sent in one request; the index fuses them and returns
    /// a single ranking.
    ServiceHybrid,
}

impl RetrievalMode {
    #[must_use]
    pub const fn uses_lexical(self) -> bool {
        matches!(self, Self::Lexical | Self::Hybrid | Self::ServiceHybrid)
    }

    #[must_use]
    pub const fn uses_vector(self) -> bool {
        matches!(self, Self::Vector | Self::Hybrid | Self::ServiceHybrid)
    }

    /// The search service combines both signals itself.
    #[must_use]
    pub const fn is_service_fused(self) -> bool {
        matches!(self, Self::ServiceHybrid)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::ServiceHybrid => "service-hybrid",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "bm25" => Ok(Self::Lexical),
            "vector" => Ok(Self::Vector),
            "hybrid" | "rrf" => Ok(Self::Hybrid),
            "service-hybrid" => Ok(Self::ServiceHybrid),
            other => Err(format!("unknown retrieval mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub mode: RetrievalMode,
    /// Hits requested from each search call.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_lexical_fields")]
    pub lexical_fields: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::default(),
            top_k: default_top_k(),
            lexical_fields: default_lexical_fields(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to the largest cutoff.
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: None,
            model: default_rerank_model(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_cutoffs")]
    pub cutoffs: Vec<usize>,
    #[serde(default)]
    pub page: PageScheme,
    #[serde(default = "default_question_column")]
    pub question_column: String,
    #[serde(default = "default_pages_column")]
    pub pages_column: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            cutoffs: default_cutoffs(),
            page: PageScheme::default(),
            question_column: default_question_column(),
            pages_column: default_pages_column(),
        }
    }
}

/// Identity used to recognise already-evaluated queries on resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeKey {
    /// Dataset name + row index. Duplicate questions are evaluated separately.
    #[default]
    Row,
    /// Exact question text. Duplicate questions collapse into one record.
    QueryText,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub key: ResumeKey,
}

/// Hit field names returned by the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitFields {
    #[serde(default = "default_id_field")]
    pub id: String,
    #[serde(default = "default_title_field")]
    pub title: String,
    #[serde(default = "default_text_field")]
    pub text: String,
    #[serde(default = "default_score_field")]
    pub score: String,
}

impl Default for HitFields {
    fn default() -> Self {
        Self {
            id: default_id_field(),
            title: default_title_field(),
            text: default_text_field(),
            score: default_score_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Overrides `https://{AZURE_SEARCH_SERVICE_NAME}.search.windows.net`.
    #[serde(default)]
    pub search_endpoint: Option<String>,
    #[serde(default = "default_search_api_version")]
    pub search_api_version: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default)]
    pub fields: HitFields,
    #[serde(default = "default_embedding_deployment")]
    pub embedding_deployment: String,
    #[serde(default = "default_openai_api_version")]
    pub openai_api_version: String,
    #[serde(default = "default_rerank_base_url")]
    pub rerank_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            search_api_version: default_search_api_version(),
            vector_field: default_vector_field(),
            fields: HitFields::default(),
            embedding_deployment: default_embedding_deployment(),
            openai_api_version: default_openai_api_version(),
            rerank_base_url: default_rerank_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_rrf_k() -> u32 {
    60
}

const fn default_top_k() -> usize {
    50
}

fn default_lexical_fields() -> Vec<String> {
    vec!["chunk".to_string()]
}

fn default_rerank_model() -> String {
    "rerank-multilingual-v2.0".to_string()
}

const fn default_max_candidates() -> usize {
    100
}

fn default_cutoffs() -> Vec<usize> {
    vec![5, 10, 25]
}

fn default_question_column() -> String {
    "Question".to_string()
}

fn default_pages_column() -> String {
    "Pages".to_string()
}

fn default_id_field() -> String {
    "chunk_id".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_text_field() -> String {
    "chunk".to_string()
}

fn default_score_field() -> String {
    "@search.score".to_string()
}

fn default_search_api_version() -> String {
    "2023-11-01".to_string()
}

fn default_vector_field() -> String {
    "vector".to_string()
}

fn default_embedding_deployment() -> String {
    "text-embedding-3-large".to_string()
}

fn default_openai_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_rerank_base_url() -> String {
    "https://api.cohere.ai".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// CLI-level overrides, applied after all file layers.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<RetrievalMode>,
    pub rerank: Option<bool>,
    pub cutoffs: Option<Vec<usize>>,
    pub top_k: Option<usize>,
}

impl RunConfig {
    /// Parse a single TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on invalid TOML or wrong field types.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load and merge the given layers, lowest precedence first. Missing
    /// optional files are skipped.
    ///
    /// # Errors
    ///
    /// Read or parse failure of any layer that exists.
    pub fn load_layers(layers: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in layers {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let table: toml::Table =
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), "config layer loaded");
            merge_tables(&mut merged, table);
        }
        let origin = layers.last().cloned().unwrap_or_default();
        toml::Value::Table(merged)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                path: origin,
                source,
            })
    }

    /// Standard resolution: user file, then `explicit` or `cwd/hybench.toml`.
    ///
    /// # Errors
    ///
    /// An explicit path that does not exist, or any read/parse failure.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            layers.push(dir.join("hybench").join("config.toml"));
        }
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Read {
                        path: path.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "config file not found",
                        ),
                    });
                }
                layers.push(path.to_path_buf());
            }
            None => layers.push(cwd.join(PROJECT_FILE)),
        }
        Self::load_layers(&layers)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(mode) = overrides.mode {
            self.retrieval.mode = mode;
        }
        if let Some(rerank) = overrides.rerank {
            self.rerank.enabled = rerank;
        }
        if let Some(cutoffs) = overrides.cutoffs {
            self.eval.cutoffs = cutoffs;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        self
    }

    /// Reject settings that would make a batch meaningless.
    ///
    /// # Errors
    ///
    /// The first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cutoffs(&self.eval.cutoffs)?;
        if self.fusion.rrf_k == 0 {
            return Err(ConfigError::Invalid {
                key: "fusion.rrf_k",
                reason: "must be positive".into(),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "retrieval.top_k",
                reason: "must be positive".into(),
            });
        }
        if self.retrieval.mode.uses_lexical() && self.retrieval.lexical_fields.is_empty() {
            return Err(ConfigError::Invalid {
                key: "retrieval.lexical_fields",
                reason: "at least one field is required for lexical search".into(),
            });
        }
        if self.rerank.top_n == Some(0) {
            return Err(ConfigError::Invalid {
                key: "rerank.top_n",
                reason: "must be positive".into(),
            });
        }
        if self.rerank.max_candidates == 0 {
            return Err(ConfigError::Invalid {
                key: "rerank.max_candidates",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Largest configured cutoff (0 only if cutoffs are empty).
    #[must_use]
    pub fn max_cutoff(&self) -> usize {
        self.eval.cutoffs.iter().copied().max().unwrap_or(0)
    }

    /// Rerank `top_n`, defaulting to the largest cutoff.
    #[must_use]
    pub fn rerank_top_n(&self) -> usize {
        self.rerank.top_n.unwrap_or_else(|| self.max_cutoff())
    }
}

/// Cutoffs must be non-empty, positive and strictly increasing.
///
/// # Errors
///
/// [`ConfigError::InvalidCutoffs`] naming the violated rule.
pub fn validate_cutoffs(cutoffs: &[usize]) -> Result<(), ConfigError> {
    let fail = |reason: &str| ConfigError::InvalidCutoffs {
        cutoffs: cutoffs.to_vec(),
        reason: reason.to_string(),
    };
    if cutoffs.is_empty() {
        return Err(fail("at least one cutoff is required"));
    }
    if cutoffs.contains(&0) {
        return Err(fail("cutoffs must be positive"));
    }
    if cutoffs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(fail("cutoffs must be strictly increasing"));
    }
    Ok(())
}

/// Parse `"5,10,25"` into cutoffs. Validation is separate.
///
/// # Errors
///
/// A token that is not an unsigned integer.
pub fn parse_cutoffs(raw: &str) -> Result<Vec<usize>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().map_err(|_| format!("invalid cutoff '{t}'")))
        .collect()
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

pub const ENV_SEARCH_SERVICE: &str = "AZURE_SEARCH_SERVICE_NAME";
pub const ENV_SEARCH_KEY: &str = "AZURE_SEARCH_API_KEY";
pub const ENV_SEARCH_INDEX: &str = "AZURE_SEARCH_INDEX_NAME";
pub const ENV_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_OPENAI_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_COHERE_KEY: &str = "COHERE_API_KEY";

/// Service secrets, read from the environment only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub search_service: Option<String>,
    pub search_key: Option<String>,
    pub search_index: Option<String>,
    pub openai_endpoint: Option<String>,
    pub openai_key: Option<String>,
    pub cohere_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Credentials")
            .field("search_service", &self.search_service)
            .field("search_key", &mask(&self.search_key))
            .field("search_index", &self.search_index)
            .field("openai_endpoint", &self.openai_endpoint)
            .field("openai_key", &mask(&self.openai_key))
            .field("cohere_key", &mask(&self.cohere_key))
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            search_service: get(ENV_SEARCH_SERVICE),
            search_key: get(ENV_SEARCH_KEY),
            search_index: get(ENV_SEARCH_INDEX),
            openai_endpoint: get(ENV_OPENAI_ENDPOINT),
            openai_key: get(ENV_OPENAI_KEY),
            cohere_key: get(ENV_COHERE_KEY),
        }
    }

    /// Variables the configured pipeline needs but are unset.
    #[must_use]
    pub fn missing_for(&self, config: &RunConfig) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.search_service.is_none() && config.services.search_endpoint.is_none() {
            missing.push(ENV_SEARCH_SERVICE);
        }
        if self.search_key.is_none() {
            missing.push(ENV_SEARCH_KEY);
        }
        if self.search_index.is_none() {
            missing.push(ENV_SEARCH_INDEX);
        }
        if config.retrieval.mode.uses_vector() {
            if self.openai_endpoint.is_none() {
                missing.push(ENV_OPENAI_ENDPOINT);
            }
            if self.openai_key.is_none() {
                missing.push(ENV_OPENAI_KEY);
            }
        }
        if config.rerank.enabled && self.cohere_key.is_none() {
            missing.push(ENV_COHERE_KEY);
        }
        missing
    }

    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] listing every unset variable.
    pub fn require_for(&self, config: &RunConfig) -> Result<(), ConfigError> {
        let vars = self.missing_for(config);
        if vars.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredential { vars })
        }
    }
}
