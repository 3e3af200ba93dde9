//! Mutation operators. Both are single-shot: the first pull consumes
//! the whole child, applies the mutation through the buffer pool, and
//! yields one `(count)` tuple; every later pull yields nothing.

use std::sync::Arc;

use strata::tuple::{Field, FieldType, Schema, SchemaField, Tuple};
use strata::{BufferPool, TransactionId};

use crate::errors::ExecError;
use crate::operator::Operator;

fn count_schema() -> Result<Arc<Schema>, ExecError> {
    Ok(Arc::new(Schema::new(vec![SchemaField::new(
        FieldType::Int,
        Some("count"),
    )])?))
}

fn count_tuple(schema: &Arc<Schema>, count: i32) -> Result<Tuple, ExecError> {
    let mut t = Tuple::new(Arc::clone(schema));
    t.set_field(0, Field::Int(count))?;
    Ok(t)
}

/// Inserts every child tuple into a table.
pub struct Insert {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<dyn Operator>,
    table_id: u32,
    schema: Arc<Schema>,
    opened: bool,
    done: bool,
}

impl Insert {
    /// Fails if the child's schema does not match the target table's.
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        child: Box<dyn Operator>,
        table_id: u32,
    ) -> Result<Self, ExecError> {
        let table_schema = pool.catalog().schema(table_id)?;
        if *child.schema().as_ref() != *table_schema {
            return Err(ExecError::InvalidArgument(format!(
                "child schema ({}) does not match table schema ({})",
                child.schema(),
                table_schema
            )));
        }
        Ok(Self {
            pool,
            tid,
            child,
            table_id,
            schema: count_schema()?,
            opened: false,
            done: false,
        })
    }
}

impl Operator for Insert {
    fn open(&mut self) -> Result<(), ExecError> {
        self.child.open()?;
        self.opened = true;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("insert is not open".into()));
        }
        if self.done {
            return Ok(None);
        }

        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.insert_tuple(self.tid, self.table_id, tuple)?;
            count += 1;
        }
        self.done = true;
        Ok(Some(count_tuple(&self.schema, count)?))
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("insert was never opened".into()));
        }
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.len() != 1 {
            return Err(ExecError::InvalidArgument(
                "insert takes exactly one child".into(),
            ));
        }
        self.close();
        self.child = children.pop().unwrap();
        Ok(())
    }
}

/// Deletes every tuple produced by the child. The child must yield
/// stored tuples (with record ids), typically straight from a scan.
pub struct Delete {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<dyn Operator>,
    schema: Arc<Schema>,
    opened: bool,
    done: bool,
}

impl Delete {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        child: Box<dyn Operator>,
    ) -> Result<Self, ExecError> {
        Ok(Self {
            pool,
            tid,
            child,
            schema: count_schema()?,
            opened: false,
            done: false,
        })
    }
}

impl Operator for Delete {
    fn open(&mut self) -> Result<(), ExecError> {
        self.child.open()?;
        self.opened = true;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("delete is not open".into()));
        }
        if self.done {
            return Ok(None);
        }

        let mut count = 0;
        while let Some(mut tuple) = self.child.next()? {
            self.pool.delete_tuple(self.tid, &mut tuple)?;
            count += 1;
        }
        self.done = true;
        Ok(Some(count_tuple(&self.schema, count)?))
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("delete was never opened".into()));
        }
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.len() != 1 {
            return Err(ExecError::InvalidArgument(
                "delete takes exactly one child".into(),
            ));
        }
        self.close();
        self.child = children.pop().unwrap();
        Ok(())
    }
}
