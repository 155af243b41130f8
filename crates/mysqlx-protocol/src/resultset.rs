//! Result set messages: column metadata and rows.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    read_field, required, write_bytes_field, write_string_field, write_uint_field,
};
use crate::error::ProtocolError;

/// Declared wire type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    /// Signed integer, zigzag varint.
    SInt = 1,
    /// Unsigned integer, varint.
    UInt = 2,
    /// 64-bit float.
    Double = 5,
    /// 32-bit float.
    Float = 6,
    /// Bytes with a trailing pad byte.
    Bytes = 7,
    /// Time of day or duration.
    Time = 10,
    /// Date or date-time.
    DateTime = 12,
    /// Set of strings.
    Set = 15,
    /// Enumeration member.
    Enum = 16,
    /// Bit field.
    Bit = 17,
    /// Packed decimal.
    Decimal = 18,
}

impl ColumnType {
    /// Create a column type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::SInt),
            2 => Ok(Self::UInt),
            5 => Ok(Self::Double),
            6 => Ok(Self::Float),
            7 => Ok(Self::Bytes),
            10 => Ok(Self::Time),
            12 => Ok(Self::DateTime),
            15 => Ok(Self::Set),
            16 => Ok(Self::Enum),
            17 => Ok(Self::Bit),
            18 => Ok(Self::Decimal),
            _ => Err(ProtocolError::InvalidTag {
                field: "column type",
                value: u32::from(value),
            }),
        }
    }
}

/// Interpretation hint for `Bytes` columns and octet scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ContentType {
    /// Plain bytes or text.
    #[default]
    Plain = 0,
    /// Geometry in WKB.
    Geometry = 1,
    /// JSON text.
    Json = 2,
    /// XML text.
    Xml = 3,
}

impl ContentType {
    /// Create a content type from a raw value.
    pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Geometry),
            2 => Ok(Self::Json),
            3 => Ok(Self::Xml),
            _ => Err(ProtocolError::InvalidTag {
                field: "content type",
                value,
            }),
        }
    }
}

bitflags! {
    /// Column flags. Bits 0-3 depend on the column type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColumnFlags: u32 {
        /// `UINT`: zerofill. `DOUBLE`/`FLOAT`/`DECIMAL`: unsigned. `BYTES`: right-padded.
        const TYPE_SPECIFIC_1 = 0x0001;
        /// `BYTES`: binary collation.
        const BINARY = 0x0002;
        /// `NOT NULL`.
        const NOT_NULL = 0x0010;
        /// Part of the primary key.
        const PRIMARY_KEY = 0x0020;
        /// Part of a unique key.
        const UNIQUE_KEY = 0x0040;
        /// Part of a non-unique key.
        const MULTIPLE_KEY = 0x0080;
        /// `AUTO_INCREMENT`.
        const AUTO_INCREMENT = 0x0100;
    }
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetaData {
    /// Wire type.
    pub column_type: ColumnType,
    /// Column label.
    pub name: String,
    /// Underlying column name.
    pub original_name: String,
    /// Table label.
    pub table: String,
    /// Underlying table name.
    pub original_table: String,
    /// Schema name.
    pub schema: String,
    /// Catalog name.
    pub catalog: String,
    /// Collation id (0 for non-string columns).
    pub collation: u64,
    /// Digits after the decimal point, or fractional second digits.
    pub fractional_digits: u32,
    /// Display width.
    pub length: u32,
    /// Flags.
    pub flags: ColumnFlags,
    /// Content hint for `Bytes` columns.
    pub content_type: ContentType,
}

impl ColumnMetaData {
    /// Create metadata with only a type and name set.
    #[must_use]
    pub fn new(column_type: ColumnType, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column_type,
            original_name: name.clone(),
            name,
            table: String::new(),
            original_table: String::new(),
            schema: String::new(),
            catalog: "def".to_string(),
            collation: 0,
            fractional_digits: 0,
            length: 0,
            flags: ColumnFlags::empty(),
            content_type: ContentType::Plain,
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the fractional digits.
    #[must_use]
    pub fn with_fractional_digits(mut self, digits: u32) -> Self {
        self.fractional_digits = digits;
        self
    }

    /// Set the table and schema.
    #[must_use]
    pub fn with_table(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.table = table.into();
        self.original_table = self.table.clone();
        self
    }

    /// Encode as a `Mysqlx.Resultset.ColumnMetaData` body.
    ///
    /// Empty strings and zero numbers are left out, matching how the server
    /// omits unset optional fields.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_uint_field(dst, 1, self.column_type as u64);
        let strings = [
            (2, &self.name),
            (3, &self.original_name),
            (4, &self.table),
            (5, &self.original_table),
            (6, &self.schema),
            (7, &self.catalog),
        ];
        for (number, value) in strings {
            if !value.is_empty() {
                write_string_field(dst, number, value);
            }
        }
        let numbers = [
            (8, self.collation),
            (9, u64::from(self.fractional_digits)),
            (10, u64::from(self.length)),
            (11, u64::from(self.flags.bits())),
            (12, self.content_type as u64),
        ];
        for (number, value) in numbers {
            if value != 0 {
                write_uint_field(dst, number, value);
            }
        }
    }

    /// Decode a `Mysqlx.Resultset.ColumnMetaData` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut column_type = None;
        let mut meta = Self::new(ColumnType::Bytes, "");
        meta.catalog.clear();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => {
                    let raw = field.as_u32()?;
                    let raw = u8::try_from(raw).map_err(|_| ProtocolError::InvalidTag {
                        field: "column type",
                        value: raw,
                    })?;
                    column_type = Some(ColumnType::from_u8(raw)?);
                }
                2 => meta.name = field.into_string("column name")?,
                3 => meta.original_name = field.into_string("column original name")?,
                4 => meta.table = field.into_string("column table")?,
                5 => meta.original_table = field.into_string("column original table")?,
                6 => meta.schema = field.into_string("column schema")?,
                7 => meta.catalog = field.into_string("column catalog")?,
                8 => meta.collation = field.as_u64()?,
                9 => meta.fractional_digits = field.as_u32()?,
                10 => meta.length = field.as_u32()?,
                11 => meta.flags = ColumnFlags::from_bits_retain(field.as_u32()?),
                12 => meta.content_type = ContentType::from_u32(field.as_u32()?)?,
                _ => {}
            }
        }
        meta.column_type = required(column_type, "ColumnMetaData.type")?;
        Ok(meta)
    }
}

/// One result row; fields stay raw until decoded against column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    /// Raw field bytes in column order. Empty bytes mean `NULL`.
    pub fields: Vec<Bytes>,
}

impl Row {
    /// Encode as a `Mysqlx.Resultset.Row` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        for f in &self.fields {
            write_bytes_field(dst, 1, f);
        }
    }

    /// Decode a `Mysqlx.Resultset.Row` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                fields.push(field.into_bytes()?);
            }
        }
        Ok(Self { fields })
    }
}
