//! The relational select: streams child tuples that satisfy a
//! predicate.

use std::sync::Arc;

use strata::tuple::{Schema, Tuple};

use crate::errors::ExecError;
use crate::operator::Operator;
use crate::predicate::Predicate;

pub struct Filter {
    predicate: Predicate,
    child: Box<dyn Operator>,
    opened: bool,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn Operator>) -> Self {
        Self {
            predicate,
            child,
            opened: false,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Operator for Filter {
    fn open(&mut self) -> Result<(), ExecError> {
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("filter is not open".into()));
        }
        while let Some(tuple) = self.child.next()? {
            if self.predicate.filter(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("filter was never opened".into()));
        }
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.len() != 1 {
            return Err(ExecError::InvalidArgument(
                "filter takes exactly one child".into(),
            ));
        }
        self.close();
        self.child = children.pop().unwrap();
        Ok(())
    }
}
