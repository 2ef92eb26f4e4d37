//! Crate error type.

/// Errors returned by the fallible edges of the crate; the routing table operations themselves
/// are total.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The supplied bytes can't form an [`Id`](crate::Id).
    #[error("invalid identifier size: expected 20 bytes, got {0}")]
    InvalidIdSize(usize),

    /// A bucket must be able to hold at least one contact.
    #[error("bucket capacity must be greater than 0")]
    InvalidCapacity,

    /// The refresh task can't tick with a zero period.
    #[error("refresh interval must be greater than 0")]
    InvalidInterval,

    /// Callbacks are dispatched as tasks, which requires a runtime at construction.
    #[error("no tokio runtime available to dispatch callbacks")]
    NoRuntime,
}

/// A [`Result`](std::result::Result) alias defaulting to the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
