use strata::error::DbError;
use thiserror::Error;

/// Errors produced while building or driving an operator tree.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Anything the storage engine reports, including
    /// `TransactionAborted` from a timed-out lock wait.
    #[error(transparent)]
    Storage(#[from] DbError),

    /// Iterator misuse: pulling from or rewinding an operator that was
    /// never opened.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
