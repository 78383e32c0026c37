//! Page extraction from opaque chunk ids.
//!
//! The indexer encodes the source page into the chunk key, for example
//! `3f2a..._pages_120` for the 121st page of a document. Two encodings have
//! been seen in evaluation datasets, so extraction is a pluggable
//! [`PageScheme`]:
//!
//! | Scheme           | Rule                                                   |
//! |------------------|--------------------------------------------------------|
//! | `pages-suffix`   | first `pages_<digits>` match, plus `offset` (default 1) |
//! | `trailing-chars` | last `count` characters of the raw id (default 2)      |
//!
//! `pages-suffix` is canonical. Extracted values pass through
//! [`normalize_page_token`] so they compare equal to ground truth.

use crate::model::{Document, normalize_page_token};
use serde::{Deserialize, Serialize};

const PAGES_MARKER: &str = "pages_";

/// Strategy for deriving a page id from a chunk id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "kebab-case")]
pub enum PageScheme {
    /// Zero-based page number after `pages_`, shifted by `offset`.
    PagesSuffix {
        #[serde(default = "default_offset")]
        offset: i64,
    },
    /// Raw suffix slice of `count` characters.
    TrailingChars {
        #[serde(default = "default_count")]
        count: usize,
    },
}

impl Default for PageScheme {
    fn default() -> Self {
        Self::PagesSuffix {
            offset: default_offset(),
        }
    }
}

const fn default_offset() -> i64 {
    1
}

const fn default_count() -> usize {
    2
}

impl PageScheme {
    /// Extract the page id from a chunk id, or `None` if the id carries none.
    #[must_use]
    pub fn extract(&self, chunk_id: &str) -> Option<String> {
        match *self {
            Self::PagesSuffix { offset } => {
                let page = first_pages_number(chunk_id)?;
                normalize_page_token(&page.checked_add(offset)?.to_string())
            }
            Self::TrailingChars { count } => {
                let total = chunk_id.chars().count();
                if total == 0 {
                    return None;
                }
                let suffix: String = chunk_id.chars().skip(total.saturating_sub(count)).collect();
                normalize_page_token(&suffix)
            }
        }
    }

    /// Page id of a document.
    #[must_use]
    pub fn page_of(&self, doc: &Document) -> Option<String> {
        self.extract(&doc.id)
    }
}

/// Value of the first `pages_<digits>` occurrence.
fn first_pages_number(id: &str) -> Option<i64> {
    id.match_indices(PAGES_MARKER).find_map(|(idx, _)| {
        let rest = &id[idx + PAGES_MARKER.len()..];
        let digits: &str = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(rest, |(end, _)| &rest[..end]);
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    })
}
