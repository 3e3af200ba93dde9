//! The pull-iterator contract every relational operator implements.

use std::sync::Arc;

use strata::tuple::{Schema, Tuple};

use crate::errors::ExecError;

/// A composable pull iterator over tuples.
///
/// `next` returns `Ok(None)` once the operator is exhausted, folding
/// the classic `has_next`/`next` pair into one call. Pulling from (or
/// rewinding) an operator that was never opened is an
/// [`ExecError::InvalidState`].
pub trait Operator {
    /// Prepares the operator and its children. Idempotent.
    fn open(&mut self) -> Result<(), ExecError>;

    /// Produces the next output tuple, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<Tuple>, ExecError>;

    /// Restarts the stream from the beginning.
    fn rewind(&mut self) -> Result<(), ExecError>;

    /// Releases resources. Idempotent.
    fn close(&mut self);

    /// The output schema; stable for the operator's whole life.
    fn schema(&self) -> &Arc<Schema>;

    /// Child operators, for plan rewriting. Leaves have none.
    fn children(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    /// Replaces the children, closing the operator first. Leaves accept
    /// only an empty replacement.
    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.is_empty() {
            Ok(())
        } else {
            Err(ExecError::InvalidArgument(
                "operator has no children".into(),
            ))
        }
    }
}
