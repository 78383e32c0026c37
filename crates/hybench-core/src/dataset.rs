//! Evaluation dataset: a CSV with one question and its gold pages per row.

use crate::error::ErrorCode;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("dataset {path} has no column '{column}' (found: {found})")]
    MissingColumn {
        path: PathBuf,
        column: String,
        found: String,
    },
}

impl DatasetError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::DatasetUnreadable
    }
}

/// One data row. `pages_raw` is parsed later so bad ground truth skips the
/// query instead of failing the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    /// 0-based data-row position.
    pub row: usize,
    pub query: String,
    pub pages_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Identity used in row-based resume keys: the file name.
    pub name: String,
    pub rows: Vec<DatasetRow>,
}

impl Dataset {
    /// Load a CSV dataset from disk.
    ///
    /// # Errors
    ///
    /// Unreadable file, malformed CSV, or a missing column.
    pub fn load(path: &Path, question_column: &str, pages_column: &str) -> Result<Self, DatasetError> {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let reader = csv::Reader::from_path(path).map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(name, path, reader, question_column, pages_column)
    }

    /// Load from any reader, e.g. an in-memory fixture.
    ///
    /// # Errors
    ///
    /// Malformed CSV or a missing column.
    pub fn from_reader(
        name: &str,
        input: impl Read,
        question_column: &str,
        pages_column: &str,
    ) -> Result<Self, DatasetError> {
        let reader = csv::Reader::from_reader(input);
        Self::read(name.to_string(), Path::new(name), reader, question_column, pages_column)
    }

    fn read<R: Read>(
        name: String,
        path: &Path,
        mut reader: csv::Reader<R>,
        question_column: &str,
        pages_column: &str,
    ) -> Result<Self, DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let headers = reader.headers().map_err(csv_err)?.clone();
        let column = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim() == wanted)
                .ok_or_else(|| DatasetError::MissingColumn {
                    path: path.to_path_buf(),
                    column: wanted.to_string(),
                    found: headers.iter().collect::<Vec<_>>().join(", "),
                })
        };
        let q_idx = column(question_column)?;
        let p_idx = column(pages_column)?;

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            rows.push(DatasetRow {
                row,
                query: record.get(q_idx).unwrap_or_default().trim().to_string(),
                pages_raw: record.get(p_idx).unwrap_or_default().to_string(),
            });
        }
        debug!(dataset = %name, rows = rows.len(), "dataset loaded");
        Ok(Self { name, rows })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the first `n` rows.
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
Question,Pages,Notes
Kolik stojí jízdenka?,\"56, 57\",x
Jak dlouho platí?,121.0,
Bez odpovědi,,
";

    #[test]
    fn reads_rows_with_positions() {
        let ds = Dataset::from_reader("faq.csv", FIXTURE.as_bytes(), "Question", "Pages").unwrap();
        assert_eq!(ds.name, "faq.csv");
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows[0].pages_raw, "56, 57");
        assert_eq!(ds.rows[1].row, 1);
        assert_eq!(ds.rows[1].pages_raw, "121.0");
        assert_eq!(ds.rows[2].pages_raw, "");
    }

    #[test]
    fn missing_column_lists_found_headers() {
        let err = Dataset::from_reader("faq.csv", FIXTURE.as_bytes(), "Query", "Pages").unwrap_err();
        match err {
            DatasetError::MissingColumn { column, found, .. } => {
                assert_eq!(column, "Query");
                assert!(found.contains("Question"));
            }
            DatasetError::Csv { .. } => panic!("expected missing column"),
        }
    }

    #[test]
    fn load_from_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.csv");
        std::fs::write(&path, FIXTURE).unwrap();
        let mut ds = Dataset::load(&path, "Question", "Pages").unwrap();
        assert_eq!(ds.name, "gold.csv");
        ds.truncate(1);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = Dataset::load(Path::new("/nonexistent/gold.csv"), "Question", "Pages").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatasetUnreadable);
    }
}
