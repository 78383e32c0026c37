use std::fmt;

/// Machine-readable error codes for scripted runs and CI gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MissingCredential,
    InvalidCutoffs,
    DatasetUnreadable,
    MissingGroundTruth,
    UpstreamTransient,
    UpstreamPermanent,
    UpstreamMalformed,
    InvalidStateTransition,
    CheckpointCorrupt,
    CheckpointWriteFailed,
    LockContention,
    ReportWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MissingCredential => "E1002",
            Self::InvalidCutoffs => "E1003",
            Self::DatasetUnreadable => "E2001",
            Self::MissingGroundTruth => "E2002",
            Self::UpstreamTransient => "E3001",
            Self::UpstreamPermanent => "E3002",
            Self::UpstreamMalformed => "E3003",
            Self::InvalidStateTransition => "E4001",
            Self::CheckpointCorrupt => "E5001",
            Self::CheckpointWriteFailed => "E5002",
            Self::LockContention => "E5003",
            Self::ReportWriteFailed => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MissingCredential => "Missing service credential or endpoint",
            Self::InvalidCutoffs => "Invalid cutoff list",
            Self::DatasetUnreadable => "Dataset could not be read",
            Self::MissingGroundTruth => "Query has no ground-truth pages",
            Self::UpstreamTransient => "Transient upstream failure",
            Self::UpstreamPermanent => "Permanent upstream failure",
            Self::UpstreamMalformed => "Malformed upstream response",
            Self::InvalidStateTransition => "Invalid query state transition",
            Self::CheckpointCorrupt => "Checkpoint file is corrupt",
            Self::CheckpointWriteFailed => "Checkpoint write failed",
            Self::LockContention => "Checkpoint is locked by another run",
            Self::ReportWriteFailed => "Report write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in hybench.toml and retry."),
            Self::MissingCredential => {
                Some("Export the AZURE_* / COHERE_API_KEY variables or disable the stage.")
            }
            Self::InvalidCutoffs => Some("Use strictly increasing positive cutoffs, e.g. 5,10,25."),
            Self::DatasetUnreadable => {
                Some("Check the dataset path and the question/pages column names.")
            }
            Self::MissingGroundTruth => None,
            Self::UpstreamTransient => Some("Raise [retry].max_attempts or the cooldown interval."),
            Self::UpstreamPermanent => Some("Check API keys, index name, and deployment name."),
            Self::UpstreamMalformed => Some("Check the API version and hit field names."),
            Self::InvalidStateTransition => Some("Report a bug with logs."),
            Self::CheckpointCorrupt => {
                Some("Inspect the checkpoint or rerun with --fresh to start over.")
            }
            Self::CheckpointWriteFailed | Self::ReportWriteFailed => {
                Some("Check disk space and write permissions.")
            }
            Self::LockContention => Some("Wait for the other hybench run to finish."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
