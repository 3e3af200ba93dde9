use std::sync::Arc;

use granite::{Database, ExecError, Operator, SeqScan};
use strata::heap_file::HeapFile;
use strata::tuple::{Field, FieldType, Schema, SchemaField, Tuple};
use tempfile::{tempdir, TempDir};

/// A database with one registered two-int-column table, backed by a
/// scratch directory that lives as long as the struct does.
pub struct TestDb {
    pub db: Database,
    pub table_id: u32,
    _dir: TempDir,
}

/// Creates a table named `name` with schema `(a int, b int)`, loads
/// `rows` into it under one committed transaction, and returns the
/// environment. Lock waits are shortened so contention tests fail fast.
pub fn setup_table(name: &str, pool_capacity: usize, rows: &[(i32, i32)]) -> TestDb {
    let dir = tempdir().unwrap();
    let db = Database::with_lock_timeouts(pool_capacity, 30, 100);

    let schema = Schema::new(vec![
        SchemaField::new(FieldType::Int, Some("a")),
        SchemaField::new(FieldType::Int, Some("b")),
    ])
    .unwrap();
    let file = HeapFile::open(dir.path().join(format!("{}.dat", name)), schema).unwrap();
    let table_id = db.catalog().add_table(Arc::new(file), name, None);

    if !rows.is_empty() {
        let tx = db.begin();
        for (a, b) in rows {
            db.pool()
                .insert_tuple(tx.id(), table_id, int_tuple(&db, table_id, *a, *b))
                .unwrap();
        }
        tx.commit().unwrap();
    }

    TestDb {
        db,
        table_id,
        _dir: dir,
    }
}

/// Builds a `(a, b)` tuple against the table's registered schema.
pub fn int_tuple(db: &Database, table_id: u32, a: i32, b: i32) -> Tuple {
    let schema = db.catalog().schema(table_id).unwrap();
    let mut t = Tuple::new(schema);
    t.set_field(0, Field::Int(a)).unwrap();
    t.set_field(1, Field::Int(b)).unwrap();
    t
}

/// Reads both int columns of a tuple.
pub fn as_pair(t: &Tuple) -> (i32, i32) {
    let a = match t.field(0) {
        Some(Field::Int(v)) => *v,
        other => panic!("expected an int in column 0, got {:?}", other),
    };
    let b = match t.field(1) {
        Some(Field::Int(v)) => *v,
        other => panic!("expected an int in column 1, got {:?}", other),
    };
    (a, b)
}

/// Scans the whole table under a fresh committed transaction and
/// returns its rows, sorted.
pub fn scan_all(db: &Database, table_id: u32) -> Vec<(i32, i32)> {
    let tx = db.begin();
    let mut scan = SeqScan::new(Arc::clone(db.pool()), tx.id(), table_id, "t").unwrap();
    scan.open().unwrap();
    let mut rows = Vec::new();
    while let Some(t) = scan.next().unwrap() {
        rows.push(as_pair(&t));
    }
    scan.close();
    tx.commit().unwrap();
    rows.sort_unstable();
    rows
}

/// A canned in-memory operator, for feeding DML operators.
pub struct StaticTuples {
    schema: Arc<Schema>,
    rows: Vec<Tuple>,
    cursor: usize,
}

impl StaticTuples {
    pub fn pairs(db: &Database, table_id: u32, values: &[(i32, i32)]) -> Self {
        let schema = db.catalog().schema(table_id).unwrap();
        let rows = values
            .iter()
            .map(|(a, b)| int_tuple(db, table_id, *a, *b))
            .collect();
        Self {
            schema,
            rows,
            cursor: 0,
        }
    }
}

impl Operator for StaticTuples {
    fn open(&mut self) -> Result<(), ExecError> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {}

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
