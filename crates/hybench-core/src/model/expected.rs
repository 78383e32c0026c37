use serde::{Deserialize, Serialize};
use std::fmt;

/// Ground-truth parse failure. The query is skipped, never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroundTruthError {
    #[error("ground-truth pages are empty")]
    Empty,
}

/// Set of page identifiers considered relevant for one query.
///
/// Pages keep the order of the dataset cell; repeats are dropped on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedPages(Vec<String>);

impl ExpectedPages {
    /// Parse a comma-delimited page cell such as `"56, 57, 97"` or `"121.0"`.
    ///
    /// # Errors
    ///
    /// Returns [`GroundTruthError::Empty`] when no token survives trimming.
    pub fn parse(raw: &str) -> Result<Self, GroundTruthError> {
        let pages = Self::from_tokens(raw.split(','));
        if pages.is_empty() {
            return Err(GroundTruthError::Empty);
        }
        Ok(pages)
    }

    /// Build from already-separated tokens, normalizing each.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pages = Self::default();
        for page in tokens
            .into_iter()
            .filter_map(|t| normalize_page_token(t.as_ref()))
        {
            pages.insert(page);
        }
        pages
    }

    fn insert(&mut self, page: String) {
        if !self.0.contains(&page) {
            self.0.push(page);
        }
    }

    #[must_use]
    pub fn contains(&self, page: &str) -> bool {
        self.0.iter().any(|p| p == page)
    }

    /// True when any of `pages` is expected.
    pub fn intersects<'a>(&self, mut pages: impl Iterator<Item = &'a str>) -> bool {
        pages.any(|p| self.contains(p))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ExpectedPages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(", "))
    }
}

/// Normalize one page token.
///
/// Whitespace is trimmed; integral numerics lose their fraction and leading
/// zeros (`"121.0"` and `"0121"` both become `"121"`). Non-numeric tokens are
/// kept verbatim. Blank tokens yield `None`.
#[must_use]
pub fn normalize_page_token(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    match token.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 => {
            #[allow(clippy::cast_possible_truncation)]
            Some(format!("{}", value as i64))
        }
        _ => Some(token.to_string()),
    }
}
