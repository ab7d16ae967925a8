//! Error taxonomy for instruction compilation.

use thiserror::Error;

/// Failure classes reported by a completion service transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Transient over-quota signal; the gateway waits and retries.
    #[error("rate limited by completion service: {0}")]
    RateLimited(String),

    #[error("completion service returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("completion service transport error: {0}")]
    Transport(String),

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("completion response contained no choices")]
    NoChoices,
}

#[derive(Debug, Error)]
pub enum CompilerError {
    /// A required constructor input was missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no pending instructions to step")]
    EmptyQueue,

    #[error("no finished instruction to retry")]
    NothingToRetry,

    #[error("completion service still rate limited after {attempts} attempts: {last_message}")]
    RetryExhausted { attempts: u32, last_message: String },

    #[error(transparent)]
    Completion(#[from] ServiceError),
}
