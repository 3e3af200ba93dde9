//! The typed row model: field types, field values, schemas and tuples.
//! Tuples are fixed-width; every width is known from the schema alone.

use std::fmt;
use std::sync::Arc;

use crate::error::DbError;
use crate::RecordId;

/// Maximum payload length of a text field. On disk a text field is a
/// 4-byte big-endian actual length followed by this many bytes of
/// zero-padded UTF-8.
pub const STRING_LEN: usize = 128;

/// The closed set of column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Text,
}

impl FieldType {
    /// Serialized width in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => 4 + STRING_LEN,
        }
    }

    /// Parses a field value from exactly `self.len()` bytes.
    pub fn parse(&self, data: &[u8]) -> Result<Field, DbError> {
        if data.len() != self.len() {
            return Err(DbError::Storage(format!(
                "field of type {:?} needs {} bytes, got {}",
                self,
                self.len(),
                data.len()
            )));
        }
        match self {
            FieldType::Int => {
                let raw: [u8; 4] = data[0..4].try_into().unwrap();
                Ok(Field::Int(i32::from_be_bytes(raw)))
            }
            FieldType::Text => {
                let raw: [u8; 4] = data[0..4].try_into().unwrap();
                let len = u32::from_be_bytes(raw) as usize;
                if len > STRING_LEN {
                    return Err(DbError::Storage(format!(
                        "text length {} exceeds maximum {}",
                        len, STRING_LEN
                    )));
                }
                let value = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Field::Text(value))
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Text => write!(f, "text"),
        }
    }
}

/// A typed column value. There is no self-describing header on disk;
/// the type is recovered from the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Text(_) => FieldType::Text,
        }
    }

    /// Appends the serialized form to `out`.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Field::Text(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(STRING_LEN);
                out.extend_from_slice(&(len as u32).to_be_bytes());
                out.extend_from_slice(&bytes[..len]);
                out.resize(out.len() + (STRING_LEN - len), 0);
            }
        }
    }
}

impl PartialOrd for Field {
    /// Ordering is defined only between fields of the same type.
    fn partial_cmp(&self, other: &Field) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => Some(a.cmp(b)),
            (Field::Text(a), Field::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One schema entry: a type and an optional column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub field_type: FieldType,
    pub name: Option<String>,
}

impl SchemaField {
    pub fn new(field_type: FieldType, name: Option<&str>) -> Self {
        Self {
            field_type,
            name: name.map(str::to_owned),
        }
    }
}

/// An ordered, non-empty sequence of typed (optionally named) columns.
/// Two schemas are equal iff their types match pairwise; names do not
/// participate in equality.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Result<Self, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidArgument(
                "a schema needs at least one field".into(),
            ));
        }
        Ok(Self { fields })
    }

    /// A schema of unnamed columns.
    pub fn unnamed(types: &[FieldType]) -> Result<Self, DbError> {
        Self::new(
            types
                .iter()
                .map(|t| SchemaField::new(*t, None))
                .collect(),
        )
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, i: usize) -> Result<FieldType, DbError> {
        self.fields
            .get(i)
            .map(|f| f.field_type)
            .ok_or_else(|| DbError::NotFound(format!("no field at index {}", i)))
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>, DbError> {
        self.fields
            .get(i)
            .map(|f| f.name.as_deref())
            .ok_or_else(|| DbError::NotFound(format!("no field at index {}", i)))
    }

    /// Index of the first field with the given name.
    pub fn index_of(&self, name: &str) -> Result<usize, DbError> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| DbError::NotFound(format!("no field named {}", name)))
    }

    /// The fixed serialized tuple width for this schema.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.len()).sum()
    }

    /// Concatenates two schemas: all of `a`'s columns, then all of `b`'s.
    pub fn merge(a: &Schema, b: &Schema) -> Schema {
        let mut fields = a.fields.clone();
        fields.extend(b.fields.iter().cloned());
        Schema { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl std::hash::Hash for Schema {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for f in &self.fields {
            f.field_type.hash(state);
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &field.name {
                Some(name) => write!(f, "{}({})", field.field_type, name)?,
                None => write!(f, "{}", field.field_type)?,
            }
        }
        Ok(())
    }
}

/// A row: a schema reference, one value slot per column (unset until
/// assigned), and the record id locating it on disk, if it is stored.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Option<Field>>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>) -> Self {
        let fields = vec![None; schema.num_fields()];
        Self {
            schema,
            fields,
            record_id: None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// The value in slot `i`, or `None` if the slot is unset or out of
    /// range.
    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i).and_then(|f| f.as_ref())
    }

    pub fn set_field(&mut self, i: usize, value: Field) -> Result<(), DbError> {
        let expected = self.schema.field_type(i).map_err(|_| {
            DbError::InvalidArgument(format!(
                "field index {} out of range for schema of {} fields",
                i,
                self.schema.num_fields()
            ))
        })?;
        if value.field_type() != expected {
            return Err(DbError::InvalidArgument(format!(
                "cannot store a {} value in a {} column",
                value.field_type(),
                expected
            )));
        }
        if let Field::Text(s) = &value {
            if s.len() > STRING_LEN {
                return Err(DbError::InvalidArgument(format!(
                    "text value of {} bytes exceeds the {} byte maximum",
                    s.len(),
                    STRING_LEN
                )));
            }
        }
        self.fields[i] = Some(value);
        Ok(())
    }

    /// Swaps in an equal schema (same types in the same order). Used when
    /// a tuple moves onto a page, whose schema becomes authoritative.
    pub fn reset_schema(&mut self, schema: Arc<Schema>) -> Result<(), DbError> {
        if *schema != *self.schema {
            return Err(DbError::InvalidArgument(format!(
                "schema mismatch: expected ({}), got ({})",
                schema, self.schema
            )));
        }
        self.schema = schema;
        Ok(())
    }
}

impl PartialEq for Tuple {
    /// Tuples compare by schema types and field values; record ids are
    /// location, not identity.
    fn eq(&self, other: &Tuple) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            match field {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "null")?,
            }
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_ints() -> Arc<Schema> {
        Arc::new(Schema::unnamed(&[FieldType::Int, FieldType::Int]).unwrap())
    }

    #[test]
    fn int_field_round_trips_big_endian() {
        let mut buf = Vec::new();
        Field::Int(-7).serialize_into(&mut buf);
        assert_eq!(buf, (-7i32).to_be_bytes());
        assert_eq!(FieldType::Int.parse(&buf).unwrap(), Field::Int(-7));
    }

    #[test]
    fn text_field_is_length_prefixed_and_padded() {
        let mut buf = Vec::new();
        Field::Text("abc".to_string()).serialize_into(&mut buf);
        assert_eq!(buf.len(), FieldType::Text.len());
        assert_eq!(&buf[0..4], &3u32.to_be_bytes());
        assert_eq!(&buf[4..7], b"abc");
        assert!(buf[7..].iter().all(|&b| b == 0));
        assert_eq!(
            FieldType::Text.parse(&buf).unwrap(),
            Field::Text("abc".to_string())
        );
    }

    #[test]
    fn parse_rejects_oversized_text_length() {
        let mut buf = vec![0u8; FieldType::Text.len()];
        buf[0..4].copy_from_slice(&(STRING_LEN as u32 + 1).to_be_bytes());
        assert!(FieldType::Text.parse(&buf).is_err());
    }

    #[test]
    fn fields_order_within_a_type_only() {
        assert!(Field::Int(1) < Field::Int(2));
        assert!(Field::Text("a".into()) < Field::Text("b".into()));
        assert_eq!(
            Field::Int(1).partial_cmp(&Field::Text("1".into())),
            None
        );
    }

    #[test]
    fn schema_equality_ignores_names() {
        let a = Schema::new(vec![
            SchemaField::new(FieldType::Int, Some("x")),
            SchemaField::new(FieldType::Text, Some("y")),
        ])
        .unwrap();
        let b = Schema::unnamed(&[FieldType::Int, FieldType::Text]).unwrap();
        let c = Schema::unnamed(&[FieldType::Text, FieldType::Int]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn schema_must_not_be_empty() {
        assert!(Schema::new(Vec::new()).is_err());
    }

    #[test]
    fn merge_concatenates_fields_and_widths() {
        let a = Schema::new(vec![SchemaField::new(FieldType::Int, Some("a"))]).unwrap();
        let b = Schema::new(vec![
            SchemaField::new(FieldType::Text, Some("b")),
            SchemaField::new(FieldType::Int, Some("c")),
        ])
        .unwrap();
        let merged = Schema::merge(&a, &b);
        assert_eq!(merged.num_fields(), 3);
        assert_eq!(merged.byte_size(), a.byte_size() + b.byte_size());
        assert_eq!(merged.field_type(0).unwrap(), FieldType::Int);
        assert_eq!(merged.field_type(1).unwrap(), FieldType::Text);
        assert_eq!(merged.field_name(2).unwrap(), Some("c"));
    }

    #[test]
    fn index_of_returns_first_match() {
        let s = Schema::new(vec![
            SchemaField::new(FieldType::Int, Some("dup")),
            SchemaField::new(FieldType::Int, Some("dup")),
        ])
        .unwrap();
        assert_eq!(s.index_of("dup").unwrap(), 0);
        assert!(s.index_of("missing").is_err());
    }

    #[test]
    fn set_field_rejects_wrong_type_and_bad_index() {
        let mut t = Tuple::new(two_ints());
        assert!(t.set_field(0, Field::Text("no".into())).is_err());
        assert!(t.set_field(2, Field::Int(1)).is_err());
        assert!(t.set_field(1, Field::Int(42)).is_ok());
        assert_eq!(t.field(1), Some(&Field::Int(42)));
        assert_eq!(t.field(0), None);
    }

    #[test]
    fn tuple_display_is_tab_separated_and_newline_terminated() {
        let mut t = Tuple::new(two_ints());
        t.set_field(0, Field::Int(1)).unwrap();
        t.set_field(1, Field::Int(2)).unwrap();
        assert_eq!(t.to_string(), "1\t2\n");
    }

    #[test]
    fn tuple_equality_ignores_record_id() {
        let mut a = Tuple::new(two_ints());
        a.set_field(0, Field::Int(1)).unwrap();
        a.set_field(1, Field::Int(2)).unwrap();
        let mut b = a.clone();
        b.set_record_id(Some(crate::RecordId::new(crate::PageId::new(0, 0), 3)));
        assert_eq!(a, b);
    }
}
