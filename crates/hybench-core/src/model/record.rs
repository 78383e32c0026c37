use super::expected::ExpectedPages;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a dataset query, used to resume a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    /// Key by the exact question text. Duplicate questions share one key.
    #[must_use]
    pub fn for_text(query: &str) -> Self {
        Self(format!("text:{query}"))
    }

    /// Key by dataset identity and 0-based row index.
    #[must_use]
    pub fn for_row(dataset: &str, row: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(dataset.as_bytes());
        hasher.update(&[0]);
        hasher.update(row.to_string().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(format!("row:{}", &hex[..32]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome at a single cutoff `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffResult {
    pub k: usize,
    /// Page ids of the first `k` retrieved documents, in rank order.
    pub pages: Vec<String>,
    /// Whether `pages` intersects the expected set.
    pub matched: bool,
    /// Binary-relevance NDCG@k over the de-duplicated page sequence.
    #[serde(default)]
    pub ndcg: f64,
}

/// Per-query evaluation outcome. One checkpoint line, one report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub key: QueryKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub query: String,
    pub expected: ExpectedPages,
    pub cutoffs: Vec<CutoffResult>,
    /// Set when reranking fell back to the fused order.
    #[serde(default)]
    pub degraded: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Result for cutoff `k`, if it was configured for this record.
    #[must_use]
    pub fn cutoff(&self, k: usize) -> Option<&CutoffResult> {
        self.cutoffs.iter().find(|c| c.k == k)
    }

    /// Match flag at `k`, if configured.
    #[must_use]
    pub fn matched_at(&self, k: usize) -> Option<bool> {
        self.cutoff(k).map(|c| c.matched)
    }

    /// Cutoff values in record order.
    pub fn ks(&self) -> impl Iterator<Item = usize> + '_ {
        self.cutoffs.iter().map(|c| c.k)
    }
}
