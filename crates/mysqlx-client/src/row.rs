//! Typed rows and column metadata.
//!
//! Column metadata arrives once per result set and is shared by every row
//! of that set through an `Arc<[Column]>`.

use std::sync::Arc;

use mysqlx_protocol::{ColumnFlags, ColumnMetaData};
use mysqlx_types::encode::column_type_name;
use mysqlx_types::{FromValue, TypeError, Value, decode_value};

/// Column metadata describing a result set column.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Column {
    /// Column label.
    pub name: String,
    /// Column index (0-based).
    pub index: usize,
    /// Wire type name (`SINT`, `BYTES`, ...).
    pub type_name: &'static str,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Full metadata as sent by the server.
    pub metadata: ColumnMetaData,
}

impl Column {
    /// Wrap protocol metadata.
    #[must_use]
    pub fn new(index: usize, metadata: ColumnMetaData) -> Self {
        Self {
            name: metadata.name.clone(),
            index,
            type_name: column_type_name(metadata.column_type),
            nullable: !metadata.flags.contains(ColumnFlags::NOT_NULL),
            metadata,
        }
    }

    /// Underlying table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.metadata.original_table
    }

    /// Schema the column belongs to.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.metadata.schema
    }

    /// Digits after the decimal point.
    #[must_use]
    pub fn fractional_digits(&self) -> u32 {
        self.metadata.fractional_digits
    }

    /// Decode one raw field of this column.
    pub fn decode(&self, field: &[u8]) -> Result<Value, TypeError> {
        decode_value(&self.metadata, field)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for usize {}
    impl Sealed for &str {}
    impl Sealed for String {}
    impl Sealed for &String {}
}

/// Something that selects a column: an index or a column name.
///
/// Name lookup is case-insensitive.
pub trait ColumnIndex: sealed::Sealed {
    /// Resolve to a position in `columns`.
    fn position(&self, columns: &[Column]) -> Result<usize, TypeError>;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[Column]) -> Result<usize, TypeError> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(TypeError::IndexOutOfRange {
                index: *self,
                len: columns.len(),
            })
        }
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &[Column]) -> Result<usize, TypeError> {
        columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(self))
            .ok_or_else(|| TypeError::UnknownColumn((*self).to_string()))
    }
}

impl ColumnIndex for String {
    fn position(&self, columns: &[Column]) -> Result<usize, TypeError> {
        self.as_str().position(columns)
    }
}

impl ColumnIndex for &String {
    fn position(&self, columns: &[Column]) -> Result<usize, TypeError> {
        self.as_str().position(columns)
    }
}

/// A decoded table row.
///
/// # Example
///
/// ```rust,ignore
/// let row = result.fetch_one().await?.unwrap();
/// let title: String = row.get("title")?;
/// let pages: Option<u32> = row.get(1)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<[Column]>,
}

impl Row {
    pub(crate) fn decode(raw: mysqlx_protocol::Row, columns: Arc<[Column]>) -> Result<Self, TypeError> {
        let values = columns
            .iter()
            .zip(raw.fields.iter())
            .map(|(column, field)| column.decode(field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values, columns })
    }

    /// Build a row from already decoded values.
    #[must_use]
    pub fn from_values(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a converted value.
    pub fn get<T: FromValue>(&self, index: impl ColumnIndex) -> Result<T, TypeError> {
        let position = index.position(&self.columns)?;
        let value = self.values.get(position).unwrap_or(&Value::Null);
        T::from_value(value)
    }

    /// Get a converted value, `None` if the column is missing or the
    /// conversion fails.
    #[must_use]
    pub fn try_get<T: FromValue>(&self, index: impl ColumnIndex) -> Option<T> {
        self.get(index).ok()
    }

    /// Raw decoded value.
    #[must_use]
    pub fn value(&self, index: impl ColumnIndex) -> Option<&Value> {
        let position = index.position(&self.columns).ok()?;
        self.values.get(position)
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take the values out of the row.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mysqlx_protocol::ColumnType;
    use mysqlx_types::encode_value;

    fn columns() -> Arc<[Column]> {
        vec![
            Column::new(
                0,
                ColumnMetaData::new(ColumnType::SInt, "id").with_flags(ColumnFlags::NOT_NULL),
            ),
            Column::new(1, ColumnMetaData::new(ColumnType::Bytes, "Title")),
        ]
        .into()
    }

    fn raw(id: i64, title: Option<&str>) -> mysqlx_protocol::Row {
        let cols = columns();
        let mut fields = vec![encode_value(&Value::Int(id), &cols[0].metadata).unwrap()];
        fields.push(match title {
            Some(t) => encode_value(&Value::from(t), &cols[1].metadata).unwrap(),
            None => Bytes::new(),
        });
        mysqlx_protocol::Row { fields }
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = Row::decode(raw(7, Some("Dune")), columns()).unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get::<String>("title").unwrap(), "Dune");
        assert_eq!(row.columns()[0].type_name, "SINT");
        assert!(!row.columns()[0].nullable);
    }

    #[test]
    fn test_null_and_missing() {
        let row = Row::decode(raw(1, None), columns()).unwrap();
        assert_eq!(row.get::<Option<String>>(1).unwrap(), None);
        assert!(matches!(row.get::<String>(1), Err(TypeError::UnexpectedNull)));
        assert!(matches!(
            row.get::<i64>("missing"),
            Err(TypeError::UnknownColumn(_))
        ));
        assert!(matches!(
            row.get::<i64>(5),
            Err(TypeError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert_eq!(row.try_get::<i64>(9), None);
    }

    #[test]
    fn test_malformed_field() {
        let bad = mysqlx_protocol::Row {
            fields: vec![Bytes::from_static(&[0x80, 0x80]), Bytes::new()],
        };
        assert!(Row::decode(bad, columns()).is_err());
    }
}
