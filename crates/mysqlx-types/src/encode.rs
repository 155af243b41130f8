//! Row field encoding.
//!
//! The inverse of [`crate::decode`], used by servers and test doubles that
//! produce result sets.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use mysqlx_protocol::codec::{write_varint, zigzag_encode};
use mysqlx_protocol::{ColumnFlags, ColumnMetaData, ColumnType, ContentType};
use rust_decimal::Decimal;

use crate::decode::{BINARY_COLLATION, DECIMAL_NEGATIVE, DECIMAL_POSITIVE, EMPTY_SET};
use crate::error::TypeError;
use crate::value::Value;

/// Collation id used for text columns (`utf8mb4_0900_ai_ci`).
pub const UTF8MB4_COLLATION: u64 = 255;

/// Trait for encoding a value into one raw row field.
pub trait FieldEncode {
    /// Encode against the column the field belongs to.
    fn encode_field(&self, column: &ColumnMetaData, buf: &mut BytesMut) -> Result<(), TypeError>;
}

impl FieldEncode for Value {
    fn encode_field(&self, column: &ColumnMetaData, buf: &mut BytesMut) -> Result<(), TypeError> {
        encode_into(self, column, buf)
    }
}

/// Encode a value as a row field of the given column.
pub fn encode_value(value: &Value, column: &ColumnMetaData) -> Result<Bytes, TypeError> {
    let mut buf = BytesMut::new();
    encode_into(value, column, &mut buf)?;
    Ok(buf.freeze())
}

fn mismatch(column: &ColumnMetaData, value: &Value) -> TypeError {
    TypeError::TypeMismatch {
        expected: column_type_name(column.column_type),
        actual: value.type_name().to_string(),
    }
}

/// Display name of a column type.
#[must_use]
pub fn column_type_name(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::SInt => "SINT",
        ColumnType::UInt => "UINT",
        ColumnType::Double => "DOUBLE",
        ColumnType::Float => "FLOAT",
        ColumnType::Bytes => "BYTES",
        ColumnType::Time => "TIME",
        ColumnType::DateTime => "DATETIME",
        ColumnType::Set => "SET",
        ColumnType::Enum => "ENUM",
        ColumnType::Bit => "BIT",
        ColumnType::Decimal => "DECIMAL",
    }
}

fn encode_into(value: &Value, column: &ColumnMetaData, buf: &mut BytesMut) -> Result<(), TypeError> {
    if value.is_null() {
        return Ok(());
    }

    match column.column_type {
        ColumnType::SInt => {
            let v = match value {
                Value::Bool(b) => i64::from(*b),
                _ => value.as_i64().ok_or_else(|| mismatch(column, value))?,
            };
            write_varint(buf, zigzag_encode(v));
        }
        ColumnType::UInt | ColumnType::Bit => {
            let v = value.as_u64().ok_or_else(|| mismatch(column, value))?;
            write_varint(buf, v);
        }
        ColumnType::Double => {
            let v = value.as_f64().ok_or_else(|| mismatch(column, value))?;
            buf.put_f64_le(v);
        }
        ColumnType::Float => {
            let v = value.as_f64().ok_or_else(|| mismatch(column, value))?;
            buf.put_f32_le(v as f32);
        }
        ColumnType::Bytes | ColumnType::Enum => {
            match (column.content_type, value) {
                (ContentType::Json, _) => buf.put_slice(value.to_json().to_string().as_bytes()),
                (_, Value::Bytes(b)) => buf.put_slice(b),
                (_, Value::Array(_) | Value::Document(_)) => return Err(mismatch(column, value)),
                _ => {
                    let text = value.to_text().ok_or_else(|| mismatch(column, value))?;
                    buf.put_slice(text.as_bytes());
                }
            }
            buf.put_u8(0);
        }
        ColumnType::Time => match value {
            Value::Time(t) => encode_time(*t, buf),
            _ => return Err(mismatch(column, value)),
        },
        ColumnType::DateTime => match value {
            Value::Date(d) => {
                write_varint(buf, u64::try_from(d.year()).map_err(|_| mismatch(column, value))?);
                write_varint(buf, u64::from(d.month()));
                write_varint(buf, u64::from(d.day()));
            }
            Value::DateTime(dt) => encode_datetime(dt, buf).map_err(|_| mismatch(column, value))?,
            _ => return Err(mismatch(column, value)),
        },
        ColumnType::Set => match value {
            Value::Array(items) if items.is_empty() => buf.put_u8(EMPTY_SET),
            Value::Array(items) => {
                for item in items {
                    let text = item.as_str().ok_or_else(|| mismatch(column, value))?;
                    write_varint(buf, text.len() as u64);
                    buf.put_slice(text.as_bytes());
                }
            }
            _ => return Err(mismatch(column, value)),
        },
        ColumnType::Decimal => {
            let d = match value {
                Value::Decimal(d) => *d,
                Value::Int(v) => Decimal::from(*v),
                Value::UInt(v) => Decimal::from(*v),
                _ => return Err(mismatch(column, value)),
            };
            encode_decimal(d, buf)?;
        }
    }
    Ok(())
}

fn encode_time(delta: TimeDelta, buf: &mut BytesMut) {
    let micros = delta.num_microseconds().unwrap_or(0);
    buf.put_u8(u8::from(micros < 0));
    let micros = micros.unsigned_abs();
    let secs = micros / 1_000_000;

    write_varint(buf, secs / 3600);
    write_varint(buf, (secs / 60) % 60);
    write_varint(buf, secs % 60);
    if micros % 1_000_000 != 0 {
        write_varint(buf, micros % 1_000_000);
    }
}

fn encode_datetime(dt: &NaiveDateTime, buf: &mut BytesMut) -> Result<(), std::num::TryFromIntError> {
    write_varint(buf, u64::try_from(dt.year())?);
    write_varint(buf, u64::from(dt.month()));
    write_varint(buf, u64::from(dt.day()));
    write_varint(buf, u64::from(dt.hour()));
    write_varint(buf, u64::from(dt.minute()));
    write_varint(buf, u64::from(dt.second()));
    let micros = dt.nanosecond() / 1_000;
    if micros != 0 {
        write_varint(buf, u64::from(micros));
    }
    Ok(())
}

/// Encode a decimal as scale byte, BCD digits and a sign nibble.
pub fn encode_decimal(value: Decimal, buf: &mut BytesMut) -> Result<(), TypeError> {
    let scale = u8::try_from(value.scale()).map_err(|_| TypeError::OutOfRange {
        target_type: "DECIMAL",
    })?;
    buf.put_u8(scale);

    let mut nibbles: Vec<u8> = value
        .mantissa()
        .unsigned_abs()
        .to_string()
        .bytes()
        .map(|b| b - b'0')
        .collect();
    nibbles.push(if value.is_sign_negative() {
        DECIMAL_NEGATIVE
    } else {
        DECIMAL_POSITIVE
    });
    if nibbles.len() % 2 == 1 {
        nibbles.push(0);
    }

    for pair in nibbles.chunks(2) {
        buf.put_u8((pair[0] << 4) | pair[1]);
    }
    Ok(())
}

/// Pick column metadata that can carry `value`.
///
/// Used when a result set is produced from values rather than a declared
/// table definition.
#[must_use]
pub fn infer_column(name: impl Into<String>, value: &Value) -> ColumnMetaData {
    let text = |meta: ColumnMetaData| ColumnMetaData {
        collation: UTF8MB4_COLLATION,
        ..meta
    };

    match value {
        Value::Bool(_) | Value::Int(_) => ColumnMetaData::new(ColumnType::SInt, name),
        Value::UInt(_) => ColumnMetaData::new(ColumnType::UInt, name),
        Value::Double(_) => ColumnMetaData::new(ColumnType::Double, name),
        Value::Decimal(d) => {
            ColumnMetaData::new(ColumnType::Decimal, name).with_fractional_digits(d.scale())
        }
        Value::Date(_) => ColumnMetaData {
            length: 10,
            ..ColumnMetaData::new(ColumnType::DateTime, name)
        },
        Value::DateTime(_) => ColumnMetaData {
            length: 26,
            ..ColumnMetaData::new(ColumnType::DateTime, name)
        },
        Value::Time(_) => ColumnMetaData::new(ColumnType::Time, name),
        Value::Bytes(_) => ColumnMetaData {
            collation: BINARY_COLLATION,
            ..ColumnMetaData::new(ColumnType::Bytes, name).with_flags(ColumnFlags::BINARY)
        },
        Value::Array(_) | Value::Document(_) => {
            ColumnMetaData::new(ColumnType::Bytes, name).with_content_type(ContentType::Json)
        }
        Value::Null | Value::String(_) => text(ColumnMetaData::new(ColumnType::Bytes, name)),
    }
}
