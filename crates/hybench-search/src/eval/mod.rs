//! Page-level evaluation and batch accuracy.

pub mod scoring;
pub mod summary;

pub use scoring::{Evaluator, ndcg_at_k};
pub use summary::{AccuracySummary, CutoffAccuracy};
