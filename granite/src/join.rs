//! Nested-loop join.

use std::sync::Arc;

use strata::tuple::{Schema, Tuple};

use crate::errors::ExecError;
use crate::operator::Operator;
use crate::predicate::JoinPredicate;

/// Joins two children by re-scanning the inner (right) child for every
/// outer tuple. The output schema is the left schema followed by the
/// right schema.
pub struct Join {
    predicate: JoinPredicate,
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    schema: Arc<Schema>,
    current_left: Option<Tuple>,
    opened: bool,
}

impl Join {
    pub fn new(
        predicate: JoinPredicate,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
    ) -> Self {
        let schema = Arc::new(Schema::merge(left.schema(), right.schema()));
        Self {
            predicate,
            left,
            right,
            schema,
            current_left: None,
            opened: false,
        }
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    fn combine(&self, left: &Tuple, right: &Tuple) -> Result<Tuple, ExecError> {
        let mut out = Tuple::new(Arc::clone(&self.schema));
        let split = left.schema().num_fields();
        for i in 0..split {
            if let Some(f) = left.field(i) {
                out.set_field(i, f.clone())?;
            }
        }
        for i in 0..right.schema().num_fields() {
            if let Some(f) = right.field(i) {
                out.set_field(split + i, f.clone())?;
            }
        }
        Ok(out)
    }
}

impl Operator for Join {
    fn open(&mut self) -> Result<(), ExecError> {
        self.left.open()?;
        self.right.open()?;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("join is not open".into()));
        }
        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some(t) => {
                        self.current_left = Some(t);
                        self.right.rewind()?;
                    }
                    None => return Ok(None),
                }
            }

            match self.right.next()? {
                Some(right) => {
                    let left = self.current_left.as_ref().unwrap();
                    if self.predicate.filter(left, &right)? {
                        let joined = self.combine(left, &right)?;
                        return Ok(Some(joined));
                    }
                }
                None => self.current_left = None,
            }
        }
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("join was never opened".into()));
        }
        self.left.rewind()?;
        self.right.rewind()?;
        self.current_left = None;
        Ok(())
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.current_left = None;
        self.opened = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.len() != 2 {
            return Err(ExecError::InvalidArgument(
                "join takes exactly two children".into(),
            ));
        }
        self.close();
        self.right = children.pop().unwrap();
        self.left = children.pop().unwrap();
        self.schema = Arc::new(Schema::merge(self.left.schema(), self.right.schema()));
        Ok(())
    }
}
