use thiserror::Error;

/// Data-integrity failures detected while building the core structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Source and target sides of the parallel corpus are misaligned
    #[error("corpus length mismatch: {source_lines} source lines vs {target_lines} target lines")]
    CorpusLengthMismatch {
        source_lines: usize,
        target_lines: usize,
    },

    /// Anomaly detector references are misaligned
    #[error("reference length mismatch: {source_refs} source references vs {target_refs} target references")]
    ReferenceLengthMismatch {
        source_refs: usize,
        target_refs: usize,
    },

    /// Nothing to index
    #[error("empty corpus")]
    EmptyCorpus,
}

/// Failures at the completion-service boundary.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Connection, DNS, TLS or timeout failures
    #[error("transport error ({backend}): {message}")]
    Transport { backend: String, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} from {backend}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("malformed response from {backend}: {message}")]
    Malformed { backend: String, message: String },

    /// Backend could not be constructed (missing key, unknown provider)
    #[error("backend configuration: {0}")]
    Config(String),
}

impl CompletionError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport { .. } => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Malformed { .. } | CompletionError::Config(_) => false,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
