use std::fmt;

/// Error kinds shared across the queue, storage, worker, and API layers.
///
/// Each variant corresponds to one of the error kinds in the TaskFlow
/// design: the API layer maps these to HTTP status codes one-for-one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Schema or range violation (bad priority, bad name length, bad status string).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown task id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Status transition requested that the status DAG forbids.
    #[error("transition disallowed: {0}")]
    TransitionDisallowed(String),

    /// Queue or storage transport error (network, filesystem, remote service).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The injected processor returned `false` or panicked.
    #[error("processor failure: {0}")]
    ProcessorFailure(String),

    /// The load balancer has no healthy backend instance to route to.
    #[error("no healthy backend")]
    NoHealthyBackend,
}

impl Error {
    pub fn invalid_input(msg: impl fmt::Display) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Self::NotFound(msg.to_string())
    }

    pub fn backend_unavailable(msg: impl fmt::Display) -> Self {
        Self::BackendUnavailable(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
