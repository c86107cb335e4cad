use thiserror::Error;

/// Convenience alias for `Result<T, SessionError>`.
pub type SessionResult<T> = Result<T, SessionError>;

/// Top-level error type for session management.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session store failed to read or write a record.
    #[error("store error: {0}")]
    Store(String),

    /// A session record could not be encoded for storage.
    #[error("encode error: {0}")]
    Encode(String),

    /// Stored bytes could not be decoded back into a session record.
    #[error("decode error: {0}")]
    Decode(String),

    /// A value could not be serialized into or out of the data bag.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O failure, typically from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A Set-Cookie header could not be constructed.
    #[error("cookie error: {0}")]
    Cookie(String),
}
