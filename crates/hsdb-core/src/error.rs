use thiserror::Error;

/// Failure states that reach the caller. Per-group and per-path failures
/// are recorded on the verdicts instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
