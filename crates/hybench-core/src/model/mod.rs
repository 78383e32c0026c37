//! Document, ranking, ground-truth, and evaluation-record types.

pub mod document;
pub mod expected;
pub mod record;

pub use document::{Document, RankedList};
pub use expected::{ExpectedPages, GroundTruthError, normalize_page_token};
pub use record::{CutoffResult, EvaluationRecord, QueryKey};
