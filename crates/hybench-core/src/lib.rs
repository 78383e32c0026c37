#![forbid(unsafe_code)]
//! hybench-core library.
//!
//! Shared building blocks for the hybrid retrieval evaluator: the document
//! and ranking model, ground-truth parsing, page extraction, run
//! configuration, the retry/cooldown policy used by every external call, and
//! the resumable checkpoint store.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at module seams, `anyhow::Result`
//!   where callers only need context.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod lock;
pub mod model;
pub mod page;
pub mod rate_limit;
pub mod report;
pub mod retry;
pub mod timing;
pub mod upstream;
