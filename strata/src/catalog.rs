//! The catalog: a process-scoped registry mapping table ids to heap
//! files, schemas and names. Operators and pages carry only ids; the
//! buffer pool resolves them to files through this registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DbError;
use crate::heap_file::HeapFile;
use crate::tuple::{FieldType, Schema, SchemaField};

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: Option<String>,
}

#[derive(Default)]
struct CatalogInner {
    names: HashMap<String, u32>,
    tables: HashMap<u32, TableEntry>,
}

pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner::default()),
        }
    }

    /// Registers a table under `name`, returning its id. A name
    /// conflict resolves in favor of the latest registration.
    pub fn add_table(
        &self,
        file: Arc<HeapFile>,
        name: &str,
        primary_key: Option<&str>,
    ) -> u32 {
        let id = file.id();
        let mut inner = self.inner.write();
        inner.names.insert(name.to_string(), id);
        inner.tables.insert(
            id,
            TableEntry {
                file,
                name: name.to_string(),
                primary_key: primary_key.map(str::to_owned),
            },
        );
        id
    }

    pub fn table_id(&self, name: &str) -> Result<u32, DbError> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NotFound(format!("no table named {}", name)))
    }

    pub fn file(&self, table_id: u32) -> Result<Arc<HeapFile>, DbError> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(|t| Arc::clone(&t.file))
            .ok_or_else(|| DbError::NotFound(format!("no table with id {}", table_id)))
    }

    pub fn schema(&self, table_id: u32) -> Result<Arc<Schema>, DbError> {
        self.file(table_id).map(|f| Arc::clone(f.schema()))
    }

    pub fn table_name(&self, table_id: u32) -> Result<String, DbError> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(|t| t.name.clone())
            .ok_or_else(|| DbError::NotFound(format!("no table with id {}", table_id)))
    }

    pub fn primary_key(&self, table_id: u32) -> Result<Option<String>, DbError> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(|t| t.primary_key.clone())
            .ok_or_else(|| DbError::NotFound(format!("no table with id {}", table_id)))
    }

    pub fn table_ids(&self) -> Vec<u32> {
        self.inner.read().tables.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.names.clear();
        inner.tables.clear();
    }

    /// Loads table definitions from a text catalog file. Each line is
    /// `name (col type[, col type[ pk]]*)` with types `int` and
    /// `string` (case-insensitive); the data file lives next to the
    /// catalog file as `name.dat`.
    pub fn load_schema<P: AsRef<Path>>(&self, catalog_file: P) -> Result<(), DbError> {
        let path = catalog_file.as_ref();
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let content = std::fs::read_to_string(path)?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let open = line.find('(').ok_or_else(|| {
                DbError::InvalidArgument(format!("invalid catalog entry: {}", line))
            })?;
            let close = line.rfind(')').ok_or_else(|| {
                DbError::InvalidArgument(format!("invalid catalog entry: {}", line))
            })?;
            let name = line[..open].trim();
            if name.is_empty() || close < open {
                return Err(DbError::InvalidArgument(format!(
                    "invalid catalog entry: {}",
                    line
                )));
            }

            let mut fields = Vec::new();
            let mut primary_key = None;
            for part in line[open + 1..close].split(',') {
                let mut words = part.trim().split_whitespace();
                let col = words.next().ok_or_else(|| {
                    DbError::InvalidArgument(format!("invalid catalog entry: {}", line))
                })?;
                let ty = words.next().ok_or_else(|| {
                    DbError::InvalidArgument(format!(
                        "missing type for column {} in: {}",
                        col, line
                    ))
                })?;
                let field_type = match ty.to_lowercase().as_str() {
                    "int" => FieldType::Int,
                    "string" => FieldType::Text,
                    other => {
                        return Err(DbError::InvalidArgument(format!(
                            "unknown type {} in: {}",
                            other, line
                        )))
                    }
                };
                if let Some(annotation) = words.next() {
                    if annotation.eq_ignore_ascii_case("pk") {
                        primary_key = Some(col.to_string());
                    } else {
                        return Err(DbError::InvalidArgument(format!(
                            "unknown annotation {} in: {}",
                            annotation, line
                        )));
                    }
                }
                fields.push(SchemaField::new(field_type, Some(col)));
            }

            let schema = Schema::new(fields)?;
            let file = HeapFile::open(base.join(format!("{}.dat", name)), schema)?;
            crate::strata_debug_log!(
                "[Catalog::load_schema] added table {} with schema {}",
                name,
                file.schema()
            );
            self.add_table(Arc::new(file), name, primary_key.as_deref());
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
