use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A chunk returned by a retrieval call.
///
/// Identity is the `id` alone; `title` and `text` may be missing from partial
/// hits and never take part in equality decisions made by fusion or rerank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable chunk key. Encodes the source page (see [`crate::page`]).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Raw relevance score reported by the backend, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            text: None,
            score: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub const fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Text length in characters; missing text counts as zero.
    #[must_use]
    pub fn text_chars(&self) -> usize {
        self.text.as_deref().map_or(0, |t| t.chars().count())
    }

    /// True when the chunk has non-blank text.
    #[must_use]
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Ordered hits from one retrieval method, best first.
///
/// Rank is the 1-based position. Ids are unique within a list: construction
/// keeps the first occurrence of a repeated id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    docs: Vec<Document>,
}

impl RankedList {
    #[must_use]
    pub const fn empty() -> Self {
        Self { docs: Vec::new() }
    }

    /// Build a list from backend hits, dropping repeated ids.
    #[must_use]
    pub fn from_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for doc in docs {
            if seen.insert(doc.id.clone()) {
                out.push(doc);
            } else {
                debug!(id = %doc.id, "dropping repeated id from ranked list");
            }
        }
        Self { docs: out }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    /// Iterate `(rank, document)` with 1-based ranks.
    pub fn iter_ranked(&self) -> impl Iterator<Item = (usize, &Document)> {
        self.docs.iter().enumerate().map(|(idx, doc)| (idx + 1, doc))
    }

    /// 1-based rank of `id`, if present.
    #[must_use]
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|d| d.id == id).map(|idx| idx + 1)
    }

    /// Keep only documents with more than `min_chars` characters of text.
    ///
    /// Documents with missing or blank text are always dropped. Ranks are
    /// reassigned contiguously afterwards.
    #[must_use]
    pub fn filter_min_text(self, min_chars: usize) -> Self {
        Self {
            docs: self
                .docs
                .into_iter()
                .filter(|d| d.has_text() && d.text_chars() > min_chars)
                .collect(),
        }
    }

    /// Truncate to the first `n` hits.
    #[must_use]
    pub fn truncated(mut self, n: usize) -> Self {
        self.docs.truncate(n);
        self
    }
}

impl FromIterator<Document> for RankedList {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self::from_documents(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &RankedList) -> Vec<&str> {
        list.documents().iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn repeated_ids_keep_first_occurrence() {
        let list = RankedList::from_documents(vec![
            Document::new("a").with_text("first"),
            Document::new("b"),
            Document::new("a").with_text("second"),
        ]);
        assert_eq!(ids(&list), vec!["a", "b"]);
        assert_eq!(list.documents()[0].text.as_deref(), Some("first"));
    }

    #[test]
    fn ranks_are_one_based_and_contiguous() {
        let list: RankedList = ["x", "y", "z"].into_iter().map(Document::new).collect();
        let ranks: Vec<usize> = list.iter_ranked().map(|(r, _)| r).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(list.rank_of("z"), Some(3));
        assert_eq!(list.rank_of("missing"), None);
    }

    #[test]
    fn min_text_filter_drops_short_and_empty() {
        let list = RankedList::from_documents(vec![
            Document::new("long").with_text("x".repeat(120)),
            Document::new("short").with_text("tiny"),
            Document::new("blank").with_text("   "),
            Document::new("none"),
        ]);
        let filtered = list.clone().filter_min_text(100);
        assert_eq!(ids(&filtered), vec!["long"]);
        assert_eq!(filtered.rank_of("long"), Some(1));

        let only_nonempty = list.filter_min_text(0);
        assert_eq!(ids(&only_nonempty), vec!["long", "short"]);
    }

    #[test]
    fn text_chars_counts_characters_not_bytes() {
        let doc = Document::new("cz").with_text("žádost");
        assert_eq!(doc.text_chars(), 6);
    }
}
