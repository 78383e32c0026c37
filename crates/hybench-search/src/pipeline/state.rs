//! Per-query lifecycle.
//!
//! ```text
//! PENDING -> EMBEDDING -> RETRIEVING -> FUSING -> [RERANKING] -> SCORED -> PERSISTED
//!    |           |            |
//!    v           v            v
//! SKIPPED    SKIPPED/FAILED  SKIPPED/FAILED
//! ```
//!
//! `PERSISTED`, `SKIPPED` and `FAILED` are terminal. Anything else is a bug
//! and is reported as [`TransitionError`].

use hybench_core::error::ErrorCode;
use hybench_core::model::QueryKey;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Pending,
    Embedding,
    Retrieving,
    Fusing,
    Reranking,
    Scored,
    Persisted,
    Skipped,
    Failed,
}

impl QueryState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Skipped | Self::Failed)
    }

    /// Whether `self -> next` is a legal edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use QueryState::{
            Embedding, Failed, Fusing, Pending, Persisted, Reranking, Retrieving, Scored, Skipped,
        };
        matches!(
            (self, next),
            (Pending, Embedding | Skipped)
                | (Embedding, Retrieving | Skipped | Failed)
                | (Retrieving, Fusing | Skipped | Failed)
                | (Fusing, Reranking | Scored)
                | (Reranking, Scored)
                | (Scored, Persisted | Failed)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Embedding => "EMBEDDING",
            Self::Retrieving => "RETRIEVING",
            Self::Fusing => "FUSING",
            Self::Reranking => "RERANKING",
            Self::Scored => "SCORED",
            Self::Persisted => "PERSISTED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: illegal transition {from} -> {to}", ErrorCode::InvalidStateTransition.code())]
pub struct TransitionError {
    pub from: QueryState,
    pub to: QueryState,
}

/// Tracks one query through its states.
#[derive(Debug, Clone)]
pub struct QueryTracker {
    key: QueryKey,
    state: QueryState,
    history: Vec<QueryState>,
}

impl QueryTracker {
    #[must_use]
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            state: QueryState::Pending,
            history: vec![QueryState::Pending],
        }
    }

    #[must_use]
    pub const fn state(&self) -> QueryState {
        self.state
    }

    /// States visited so far, starting at `PENDING`.
    #[must_use]
    pub fn history(&self) -> &[QueryState] {
        &self.history
    }

    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// # Errors
    ///
    /// [`TransitionError`] if `next` is not reachable from the current state.
    pub fn advance(&mut self, next: QueryState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        debug!(key = %self.key, from = %self.state, to = %next, "query transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use QueryState::*;

    #[test]
    fn happy_path_with_rerank() {
        let mut t = QueryTracker::new(QueryKey::for_text("q"));
        for s in [Embedding, Retrieving, Fusing, Reranking, Scored, Persisted] {
            t.advance(s).unwrap();
        }
        assert!(t.state().is_terminal());
        assert_eq!(t.history().len(), 7);
    }

    #[test]
    fn rerank_is_optional() {
        let mut t = QueryTracker::new(QueryKey::for_text("q"));
        for s in [Embedding, Retrieving, Fusing, Scored, Persisted] {
            t.advance(s).unwrap();
        }
    }

    #[test]
    fn illegal_edges_are_rejected() {
        let mut t = QueryTracker::new(QueryKey::for_text("q"));
        let err = t.advance(Scored).unwrap_err();
        assert_eq!(err.from, Pending);
        assert!(err.to_string().starts_with("E4001"));
        assert_eq!(t.state(), Pending);

        assert!(!Persisted.can_transition_to(Pending));
        assert!(!Skipped.can_transition_to(Embedding));
        assert!(!Fusing.can_transition_to(Failed));
    }

    #[test]
    fn early_exits() {
        assert!(Pending.can_transition_to(Skipped));
        assert!(Embedding.can_transition_to(Failed));
        assert!(Retrieving.can_transition_to(Skipped));
    }
}
