#![forbid(unsafe_code)]
//! hybench-search library.
//!
//! Reciprocal Rank Fusion, the fail-open reranker adapter, page-level
//! evaluation, and the orchestrator that drives a dataset through them.
//!
//! # Conventions
//!
//! - **Errors**: service failures arrive as `hybench_core::upstream::ServiceError`
//!   and are classified by the retry layer; nothing here panics on bad
//!   upstream data.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod eval;
pub mod fusion;
pub mod pipeline;
pub mod rerank;

pub use eval::{AccuracySummary, Evaluator};
pub use fusion::{FusedDocument, fuse_documents, rrf_fuse};
pub use pipeline::{BatchOutcome, Orchestrator, QueryItem, Services};
pub use rerank::{RelevanceModel, RerankHit, RerankOutcome, Reranker};
