//! Query pipeline: service seams, per-query state machine, batch driver.

pub mod orchestrator;
pub mod services;
pub mod state;

pub use orchestrator::{
    BatchOutcome, Orchestrator, QueryIssue, QueryItem, QueryOutcome, QueryRun, Ranking, Services,
    StepError,
};
pub use services::{Embedder, Retriever};
pub use state::{QueryState, QueryTracker, TransitionError};
