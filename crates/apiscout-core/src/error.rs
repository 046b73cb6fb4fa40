/// Error kinds shared across the WWW, Indexer, Search Engine, and Gateway.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("cancelled")]
    Cancelled,
    #[error("empty index")]
    EmptyIndex,
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    /// A retried-and-exhausted transient failure (network, 5xx, rate limit).
    #[error("transient failure: {0}")]
    Transient(String),
    /// A non-retryable failure (4xx other than 429).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
