//! Error taxonomy for the upstream clients.
//!
//! None of these errors reach the end user as a fault: the pipeline
//! resolves every failure path to a user-visible text outcome. Screening
//! failures are resolved by the configured [`FailurePolicy`]; completion
//! failures degrade to an empty generated reply.
//!
//! [`FailurePolicy`]: crate::screening::FailurePolicy

/// Failure talking to the screening service.
#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("screening transport error: {0}")]
    Transport(String),

    #[error("screening request timed out")]
    Timeout,

    #[error("screening response decode error: {0}")]
    Decode(String),
}

/// Failure talking to the completion service.
///
/// A single malformed stream event is not an error value; it is logged
/// and skipped by the client without terminating the stream.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("completion request timed out")]
    Timeout,
}

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {message}")]
    InvalidVar { name: &'static str, message: String },
}
