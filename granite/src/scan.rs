//! Sequential scan over one table.

use std::sync::Arc;

use strata::heap_file::HeapFileScan;
use strata::tuple::{Schema, SchemaField, Tuple};
use strata::{BufferPool, TransactionId};

use crate::errors::ExecError;
use crate::operator::Operator;

/// Reads every tuple of a table in storage order. The output schema
/// carries the scan's alias: each column is renamed to
/// `alias.columnName`, types unchanged.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: u32,
    alias: String,
    schema: Arc<Schema>,
    scan: Option<HeapFileScan>,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> Result<Self, ExecError> {
        let base = pool.catalog().schema(table_id)?;
        let fields: Vec<SchemaField> = base
            .iter()
            .map(|f| SchemaField {
                field_type: f.field_type,
                name: f.name.as_deref().map(|n| format!("{}.{}", alias, n)),
            })
            .collect();
        let schema = Arc::new(Schema::new(fields)?);

        Ok(Self {
            pool,
            tid,
            table_id,
            alias: alias.to_string(),
            schema,
            scan: None,
        })
    }

    /// The scanned table's registered name.
    pub fn table_name(&self) -> Result<String, ExecError> {
        Ok(self.pool.catalog().table_name(self.table_id)?)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Operator for SeqScan {
    fn open(&mut self) -> Result<(), ExecError> {
        if self.scan.is_none() {
            let file = self.pool.catalog().file(self.table_id)?;
            let mut scan = HeapFileScan::new(file, self.tid, Arc::clone(&self.pool));
            scan.open()?;
            self.scan = Some(scan);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        let scan = self
            .scan
            .as_mut()
            .ok_or_else(|| ExecError::InvalidState("scan is not open".into()))?;
        match scan.next()? {
            Some(mut tuple) => {
                // Same types, aliased names.
                tuple.reset_schema(Arc::clone(&self.schema))?;
                Ok(Some(tuple))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        let scan = self
            .scan
            .as_mut()
            .ok_or_else(|| ExecError::InvalidState("scan was never opened".into()))?;
        scan.rewind()?;
        Ok(())
    }

    fn close(&mut self) {
        self.scan = None;
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
