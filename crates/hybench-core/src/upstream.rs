//! Error taxonomy for calls to external services.
//!
//! Every adapter (embedding, lexical/vector search, rerank) reports failures
//! as a [`ServiceError`]. The retry layer only needs
//! [`ServiceError::is_retryable`]; the orchestrator uses the variant to decide
//! between `FAILED` (retries exhausted) and `SKIPPED` (permanent rejection).

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The external service a call was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Embedding,
    LexicalSearch,
    VectorSearch,
    HybridSearch,
    Rerank,
}

impl Service {
    /// Stable operation name, also used as the timing key.
    #[must_use]
    pub const fn op_name(self) -> &'static str {
        match self {
            Self::Embedding => "embed",
            Self::LexicalSearch => "search.lexical",
            Self::VectorSearch => "search.vector",
            Self::HybridSearch => "search.hybrid",
            Self::Rerank => "rerank",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op_name())
    }
}

/// Failure of a single external call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The call did not complete within the client timeout.
    #[error("{service} timed out: {message}")]
    Timeout { service: Service, message: String },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("{service} transport error: {message}")]
    Transport { service: Service, message: String },

    /// HTTP 429 or an explicit quota response.
    #[error("{service} rate limited (HTTP {status})")]
    RateLimited {
        service: Service,
        status: u16,
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx or 408.
    #[error("{service} unavailable (HTTP {status}): {message}")]
    Unavailable {
        service: Service,
        status: u16,
        message: String,
    },

    /// Any other 4xx: bad credentials, unknown index, invalid body.
    #[error("{service} rejected the request (HTTP {status}): {message}")]
    Rejected {
        service: Service,
        status: u16,
        message: String,
    },

    /// The body could not be decoded into the expected shape.
    #[error("{service} returned a malformed response: {message}")]
    Malformed { service: Service, message: String },
}

impl ServiceError {
    /// Classify an HTTP error status into the taxonomy.
    #[must_use]
    pub fn from_status(service: Service, status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            429 => Self::RateLimited {
                service,
                status,
                retry_after: None,
            },
            408 | 500..=599 => Self::Unavailable {
                service,
                status,
                message,
            },
            _ => Self::Rejected {
                service,
                status,
                message,
            },
        }
    }

    /// Whether the retry policy should try the call again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// The service that produced this error.
    #[must_use]
    pub const fn service(&self) -> Service {
        match self {
            Self::Timeout { service, .. }
            | Self::Transport { service, .. }
            | Self::RateLimited { service, .. }
            | Self::Unavailable { service, .. }
            | Self::Rejected { service, .. }
            | Self::Malformed { service, .. } => *service,
        }
    }

    /// Server-provided minimum wait before the next attempt, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Machine-readable code for this failure class.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::RateLimited { .. }
            | Self::Unavailable { .. } => ErrorCode::UpstreamTransient,
            Self::Rejected { .. } => ErrorCode::UpstreamPermanent,
            Self::Malformed { .. } => ErrorCode::UpstreamMalformed,
        }
    }
}
