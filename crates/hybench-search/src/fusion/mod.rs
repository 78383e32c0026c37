//! Rank fusion of lexical and vector retrieval results.

pub mod rrf;

pub use rrf::{FusedDocument, fuse_documents, prefilter, rrf_contribution, rrf_fuse};
