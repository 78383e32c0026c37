//! Append-only JSONL checkpoint of completed queries.
//!
//! One [`EvaluationRecord`] per line. A record is appended only after its
//! query reached `PERSISTED`, with the whole line in one `write_all` followed
//! by `sync_data`, so a crash leaves at most one torn trailing line. That
//! line is truncated on open, exactly like a torn event-log write.
//!
//! The store holds an exclusive lock on `<checkpoint>.lock` for its whole
//! lifetime.

use crate::error::ErrorCode;
use crate::lock::{CheckpointLock, LockError, lock_path_for};
use crate::model::{EvaluationRecord, QueryKey};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint {path} line {line} is not a valid record: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl CheckpointError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } | Self::Encode(_) => ErrorCode::CheckpointWriteFailed,
            Self::Corrupt { .. } => ErrorCode::CheckpointCorrupt,
            Self::Lock(err) => err.code(),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Open checkpoint owned by one run.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    file: File,
    index: HashMap<QueryKey, usize>,
    records: Vec<EvaluationRecord>,
    _lock: CheckpointLock,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint at `path`, repairing a torn tail and
    /// loading every existing record.
    ///
    /// # Errors
    ///
    /// Lock contention, I/O failure, or a corrupt line other than the tail.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        Self::open_with(path, false)
    }

    /// Like [`CheckpointStore::open`] but discards existing records first.
    ///
    /// # Errors
    ///
    /// Lock contention or I/O failure.
    pub fn open_fresh(path: &Path) -> Result<Self, CheckpointError> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, fresh: bool) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(path))?;
        }
        let lock = CheckpointLock::acquire(&lock_path_for(path), LOCK_TIMEOUT)?;

        if fresh && path.exists() {
            fs::write(path, b"").map_err(io_err(path))?;
            info!(path = %path.display(), "checkpoint reset");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err(path))?;

        repair_torn_tail(path)?;
        let records = read_records(path)?;
        let index = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.key.clone(), idx))
            .collect();
        if !records.is_empty() {
            info!(path = %path.display(), records = records.len(), "checkpoint loaded");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            records,
            _lock: lock,
        })
    }

    /// Whether a record with this key is already persisted.
    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.index.contains_key(key)
    }

    /// Current record for `key`.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<&EvaluationRecord> {
        self.index.get(key).map(|&idx| &self.records[idx])
    }

    /// Durably append one record. A record for a key that is already present
    /// supersedes the earlier one.
    ///
    /// # Errors
    ///
    /// Encoding or I/O failure. The in-memory index is only updated after the
    /// line has been synced.
    pub fn append(&mut self, record: &EvaluationRecord) -> Result<(), CheckpointError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(io_err(&self.path))?;
        debug!(key = %record.key, "record persisted");
        match self.index.get(&record.key) {
            Some(&idx) => self.records[idx] = record.clone(),
            None => {
                self.index.insert(record.key.clone(), self.records.len());
                self.records.push(record.clone());
            }
        }
        Ok(())
    }

    /// One record per key, in first-seen file order.
    #[must_use]
    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate an incomplete trailing line. Returns the number of bytes removed.
///
/// # Errors
///
/// I/O failure reading or truncating the file.
pub fn repair_torn_tail(path: &Path) -> Result<u64, CheckpointError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(io_err(path)(err)),
    };
    if content.is_empty() || content.last() == Some(&b'\n') {
        return Ok(0);
    }

    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    let removed = (content.len() - keep) as u64;

    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(keep as u64))
        .map_err(io_err(path))?;

    warn!(
        path = %path.display(),
        bytes_removed = removed,
        "torn checkpoint write repaired: truncated incomplete trailing line"
    );
    Ok(removed)
}

/// Read all records without taking the lock. Blank lines are ignored and a
/// later line for the same key replaces the earlier one in place.
///
/// Used by `summarize` and on open.
///
/// # Errors
///
/// I/O failure or a line that does not decode.
pub fn read_records(path: &Path) -> Result<Vec<EvaluationRecord>, CheckpointError> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    let mut index: HashMap<QueryKey, usize> = HashMap::new();
    let mut records: Vec<EvaluationRecord> = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EvaluationRecord =
            serde_json::from_str(line).map_err(|source| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
        match index.get(&record.key) {
            Some(&slot) => records[slot] = record,
            None => {
                index.insert(record.key.clone(), records.len());
                records.push(record);
            }
        }
    }
    Ok(records)
}
