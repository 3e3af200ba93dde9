use thiserror::Error;

/// Errors produced by the storage engine.
#[derive(Error, Debug)]
pub enum DbError {
    /// Malformed input; a programming error at the call site.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A catalog or schema lookup missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation was invoked on an object in the wrong state,
    /// e.g. pulling from a cursor that was never opened.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A lock acquisition timed out. The caller must abort the
    /// transaction with `transaction_complete(tid, false)`.
    #[error("transaction aborted: lock wait timed out")]
    TransactionAborted,

    /// An unrecoverable local condition: page full on insert, tuple not
    /// on page on delete, no clean page to evict.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
