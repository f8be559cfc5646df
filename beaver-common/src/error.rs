use thiserror::Error;

/// Error kinds per the error handling design: every fallible operation in
/// `beaver-core` returns one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("session already closed")]
    AlreadyClosed,

    #[error("timed out waiting for {0}")]
    TimedOut(String),

    #[error("empty")]
    Empty,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config mismatch: {0}")]
    ConfigMismatch(String),

    #[error("corrupted: {0}")]
    Corrupted(String),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
