//! Row field decoding.
//!
//! Each field of a row arrives as raw bytes whose layout is fixed by the
//! column's declared [`ColumnType`]. An empty field is always `NULL`.

use bytes::Buf;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use mysqlx_protocol::codec::{read_varint, zigzag_decode};
use mysqlx_protocol::{ColumnFlags, ColumnMetaData, ColumnType, ContentType, ProtocolError};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::value::{DbDoc, Value};

/// Collation id of binary strings.
pub const BINARY_COLLATION: u64 = 63;

/// Marker byte for an empty `SET`.
pub(crate) const EMPTY_SET: u8 = 0x01;

/// Nibble closing a positive packed decimal.
pub(crate) const DECIMAL_POSITIVE: u8 = 0x0c;

/// Nibble closing a negative packed decimal.
pub(crate) const DECIMAL_NEGATIVE: u8 = 0x0d;

/// Trait for decoding a value from one raw row field.
pub trait FieldDecode: Sized {
    /// Decode a field against its column metadata.
    fn decode_field(column: &ColumnMetaData, field: &[u8]) -> Result<Self, TypeError>;
}

impl FieldDecode for Value {
    fn decode_field(column: &ColumnMetaData, field: &[u8]) -> Result<Self, TypeError> {
        decode_value(column, field)
    }
}

/// Decode one row field into a [`Value`].
pub fn decode_value(column: &ColumnMetaData, field: &[u8]) -> Result<Value, TypeError> {
    if field.is_empty() {
        return Ok(Value::Null);
    }

    match column.column_type {
        ColumnType::SInt => decode_sint(field),
        ColumnType::UInt => decode_uint(field, "UINT"),
        ColumnType::Bit => decode_uint(field, "BIT"),
        ColumnType::Double => decode_double(field),
        ColumnType::Float => decode_float(field),
        ColumnType::Bytes => decode_bytes(column, field),
        ColumnType::Enum => decode_padded_text(field, "ENUM").map(Value::String),
        ColumnType::Time => decode_time(field).map(Value::Time),
        ColumnType::DateTime => decode_datetime(column, field),
        ColumnType::Set => decode_set(field),
        ColumnType::Decimal => decode_decimal(field).map(Value::Decimal),
    }
}

fn malformed(column_type: &'static str) -> impl Fn(ProtocolError) -> TypeError {
    move |e| TypeError::malformed(column_type, e.to_string())
}

fn expect_consumed(src: &[u8], column_type: &'static str) -> Result<(), TypeError> {
    if src.is_empty() {
        Ok(())
    } else {
        Err(TypeError::malformed(
            column_type,
            format!("{} trailing bytes", src.len()),
        ))
    }
}

fn decode_sint(mut src: &[u8]) -> Result<Value, TypeError> {
    let raw = read_varint(&mut src).map_err(malformed("SINT"))?;
    expect_consumed(src, "SINT")?;
    Ok(Value::Int(zigzag_decode(raw)))
}

fn decode_uint(mut src: &[u8], column_type: &'static str) -> Result<Value, TypeError> {
    let raw = read_varint(&mut src).map_err(malformed(column_type))?;
    expect_consumed(src, column_type)?;
    Ok(Value::UInt(raw))
}

fn decode_double(field: &[u8]) -> Result<Value, TypeError> {
    let bytes: [u8; 8] = field
        .try_into()
        .map_err(|_| TypeError::malformed("DOUBLE", format!("expected 8 bytes, got {}", field.len())))?;
    Ok(Value::Double(f64::from_le_bytes(bytes)))
}

fn decode_float(field: &[u8]) -> Result<Value, TypeError> {
    let bytes: [u8; 4] = field
        .try_into()
        .map_err(|_| TypeError::malformed("FLOAT", format!("expected 4 bytes, got {}", field.len())))?;
    Ok(Value::Double(f64::from(f32::from_le_bytes(bytes))))
}

/// Strip the mandatory trailing pad byte.
fn strip_pad<'a>(field: &'a [u8], column_type: &'static str) -> Result<&'a [u8], TypeError> {
    match field.split_last() {
        Some((0, body)) => Ok(body),
        _ => Err(TypeError::malformed(column_type, "missing trailing pad byte")),
    }
}

fn decode_padded_text(field: &[u8], column_type: &'static str) -> Result<String, TypeError> {
    let body = strip_pad(field, column_type)?;
    String::from_utf8(body.to_vec()).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

fn decode_bytes(column: &ColumnMetaData, field: &[u8]) -> Result<Value, TypeError> {
    let body = strip_pad(field, "BYTES")?;

    match column.content_type {
        ContentType::Json => {
            let json: serde_json::Value = serde_json::from_slice(body)
                .map_err(|e| TypeError::InvalidJson(e.to_string()))?;
            Ok(Value::from(json))
        }
        ContentType::Geometry | ContentType::Xml => Ok(Value::Bytes(body.to_vec().into())),
        ContentType::Plain => {
            if column.flags.contains(ColumnFlags::BINARY) || column.collation == BINARY_COLLATION {
                Ok(Value::Bytes(body.to_vec().into()))
            } else {
                String::from_utf8(body.to_vec())
                    .map(Value::String)
                    .map_err(|e| TypeError::InvalidEncoding(e.to_string()))
            }
        }
    }
}

/// Read up to `N` trailing varints; missing components are zero.
fn read_components<const N: usize>(
    src: &mut &[u8],
    column_type: &'static str,
) -> Result<([u64; N], usize), TypeError> {
    let mut parts = [0u64; N];
    let mut count = 0;
    while count < N && src.has_remaining() {
        parts[count] = read_varint(src).map_err(malformed(column_type))?;
        count += 1;
    }
    expect_consumed(*src, column_type)?;
    Ok((parts, count))
}

/// Decode a `TIME` field: sign byte, then hours, minutes, seconds, micros.
pub fn decode_time(field: &[u8]) -> Result<TimeDelta, TypeError> {
    let (&sign, mut rest) = field
        .split_first()
        .ok_or_else(|| TypeError::malformed("TIME", "missing sign byte"))?;
    let negative = match sign {
        0 => false,
        1 => true,
        other => {
            return Err(TypeError::malformed("TIME", format!("invalid sign byte {other}")));
        }
    };

    let ([hours, minutes, seconds, micros], _) = read_components::<4>(&mut rest, "TIME")?;
    if minutes > 59 || seconds > 59 || micros > 999_999 {
        return Err(TypeError::InvalidDateTime(format!(
            "time component out of range: {hours}:{minutes}:{seconds}.{micros}"
        )));
    }

    let total = hours
        .checked_mul(3_600_000_000)
        .and_then(|v| v.checked_add(minutes * 60_000_000 + seconds * 1_000_000 + micros))
        .and_then(|v| i64::try_from(v).ok())
        .ok_or(TypeError::OutOfRange { target_type: "TIME" })?;

    let delta = TimeDelta::microseconds(total);
    Ok(if negative { -delta } else { delta })
}

fn decode_datetime(column: &ColumnMetaData, field: &[u8]) -> Result<Value, TypeError> {
    let mut src = field;
    let ([year, month, day, hour, minute, second, micros], count) =
        read_components::<7>(&mut src, "DATETIME")?;
    if count < 3 {
        return Err(TypeError::malformed("DATETIME", "missing date components"));
    }

    let invalid = || TypeError::InvalidDateTime(format!("{year}-{month}-{day}"));
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).map_err(|_| invalid())?,
        u32::try_from(month).map_err(|_| invalid())?,
        u32::try_from(day).map_err(|_| invalid())?,
    )
    .ok_or_else(invalid)?;

    // DATE columns are at most 10 characters wide ("YYYY-MM-DD").
    if count == 3 && column.length <= 10 {
        return Ok(Value::Date(date));
    }

    let invalid_time =
        || TypeError::InvalidDateTime(format!("{hour}:{minute}:{second}.{micros}"));
    let time = NaiveTime::from_hms_micro_opt(
        u32::try_from(hour).map_err(|_| invalid_time())?,
        u32::try_from(minute).map_err(|_| invalid_time())?,
        u32::try_from(second).map_err(|_| invalid_time())?,
        u32::try_from(micros).map_err(|_| invalid_time())?,
    )
    .ok_or_else(invalid_time)?;

    Ok(Value::DateTime(NaiveDateTime::new(date, time)))
}

fn decode_set(field: &[u8]) -> Result<Value, TypeError> {
    if field == [EMPTY_SET] {
        return Ok(Value::Array(Vec::new()));
    }

    let mut src = field;
    let mut members = Vec::new();
    while src.has_remaining() {
        let len = read_varint(&mut src).map_err(malformed("SET"))?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&n| n <= src.len())
            .ok_or_else(|| TypeError::malformed("SET", "member length exceeds field"))?;
        let member = String::from_utf8(src[..len].to_vec())
            .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
        members.push(Value::String(member));
        src.advance(len);
    }
    Ok(Value::Array(members))
}

/// Decode a packed `DECIMAL`: scale byte, BCD digits, sign nibble.
pub fn decode_decimal(field: &[u8]) -> Result<Decimal, TypeError> {
    let (&scale, packed) = field
        .split_first()
        .ok_or_else(|| TypeError::malformed("DECIMAL", "missing scale byte"))?;

    let mut mantissa: i128 = 0;
    let mut negative = None;
    'bytes: for &byte in packed {
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => {
                    mantissa = mantissa
                        .checked_mul(10)
                        .and_then(|m| m.checked_add(i128::from(nibble)))
                        .ok_or(TypeError::OutOfRange {
                            target_type: "Decimal",
                        })?;
                }
                DECIMAL_POSITIVE => {
                    negative = Some(false);
                    break 'bytes;
                }
                DECIMAL_NEGATIVE => {
                    negative = Some(true);
                    break 'bytes;
                }
                other => {
                    return Err(TypeError::malformed(
                        "DECIMAL",
                        format!("invalid nibble {other:#x}"),
                    ));
                }
            }
        }
    }

    let negative =
        negative.ok_or_else(|| TypeError::malformed("DECIMAL", "missing sign nibble"))?;
    if negative {
        mantissa = -mantissa;
    }

    Decimal::try_from_i128_with_scale(mantissa, u32::from(scale))
        .map_err(|e| TypeError::InvalidDecimal(e.to_string()))
}

/// Decode a `BYTES` field holding JSON into a document.
pub fn decode_document(field: &[u8]) -> Result<DbDoc, TypeError> {
    let body = strip_pad(field, "BYTES")?;
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| TypeError::InvalidJson(e.to_string()))?;
    DbDoc::from_json(json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn column(column_type: ColumnType) -> ColumnMetaData {
        ColumnMetaData::new(column_type, "c")
    }

    #[test]
    fn test_empty_field_is_null() {
        for ty in [ColumnType::SInt, ColumnType::Bytes, ColumnType::Decimal] {
            assert_eq!(decode_value(&column(ty), &[]).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_sint_zigzag() {
        assert_eq!(decode_value(&column(ColumnType::SInt), &[0x03]).unwrap(), Value::Int(-2));
        assert_eq!(decode_value(&column(ColumnType::SInt), &[0x04]).unwrap(), Value::Int(2));
        assert_eq!(
            decode_value(&column(ColumnType::UInt), &[0xac, 0x02]).unwrap(),
            Value::UInt(300)
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = decode_value(&column(ColumnType::SInt), &[0x02, 0x00]).unwrap_err();
        assert!(matches!(err, TypeError::Malformed { column_type: "SINT", .. }));
    }

    #[test]
    fn test_float_widened() {
        let field = 1.5f32.to_le_bytes();
        assert_eq!(
            decode_value(&column(ColumnType::Float), &field).unwrap(),
            Value::Double(1.5)
        );
        assert!(decode_value(&column(ColumnType::Double), &field).is_err());
    }

    #[test]
    fn test_bytes_by_content_type() {
        let text = column(ColumnType::Bytes);
        assert_eq!(
            decode_value(&text, b"abc\0").unwrap(),
            Value::String("abc".into())
        );

        let json = column(ColumnType::Bytes).with_content_type(ContentType::Json);
        let value = decode_value(&json, b"{\"a\":[1,2]}\0").unwrap();
        assert_eq!(value.get("a"), Some(&Value::Array(vec![Value::Int(1), Value::Int(2)])));

        let binary = column(ColumnType::Bytes).with_flags(ColumnFlags::BINARY);
        assert_eq!(
            decode_value(&binary, &[0xff, 0x00, 0x00]).unwrap(),
            Value::Bytes(vec![0xff, 0x00].into())
        );

        assert!(decode_value(&text, b"abc").is_err());
    }

    #[test]
    fn test_time() {
        // -01:02:03.000004
        let value = decode_value(&column(ColumnType::Time), &[1, 1, 2, 3, 4]).unwrap();
        assert_eq!(value.to_text().unwrap(), "-01:02:03.000004");

        // Trailing components may be omitted.
        let value = decode_value(&column(ColumnType::Time), &[0, 12]).unwrap();
        assert_eq!(value.to_text().unwrap(), "12:00:00");
    }

    #[test]
    fn test_date_and_datetime() {
        // 2024-02-29
        let field = [0xe8, 0x0f, 2, 29];
        let mut date_col = column(ColumnType::DateTime);
        date_col.length = 10;
        assert_eq!(
            decode_value(&date_col, &field).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );

        let mut dt_col = column(ColumnType::DateTime);
        dt_col.length = 19;
        let value = decode_value(&dt_col, &[0xe8, 0x0f, 2, 29, 13, 5]).unwrap();
        assert_eq!(value.to_text().unwrap(), "2024-02-29 13:05:00");

        assert!(decode_value(&date_col, &[0xe8, 0x0f, 2, 30]).is_err());
    }

    #[test]
    fn test_set() {
        let col = column(ColumnType::Set);
        assert_eq!(decode_value(&col, &[0x01]).unwrap(), Value::Array(vec![]));
        assert_eq!(
            decode_value(&col, &[1, b'a', 2, b'b', b'c']).unwrap(),
            Value::from(vec!["a", "bc"])
        );
        assert!(decode_value(&col, &[5, b'a']).is_err());
    }

    #[test]
    fn test_decimal() {
        // scale 2, digits 1234, positive
        let value = decode_decimal(&[2, 0x12, 0x34, 0xc0]).unwrap();
        assert_eq!(value, Decimal::from_str("12.34").unwrap());

        // scale 1, digits 567, negative (sign shares the last byte)
        let value = decode_decimal(&[1, 0x56, 0x7d]).unwrap();
        assert_eq!(value, Decimal::from_str("-56.7").unwrap());

        assert!(decode_decimal(&[1, 0x56, 0x70]).is_err());
        assert!(decode_decimal(&[0, 0x5f]).is_err());
    }

    #[test]
    fn test_enum_and_bit() {
        assert_eq!(
            decode_value(&column(ColumnType::Enum), b"red\0").unwrap(),
            Value::String("red".into())
        );
        assert_eq!(
            decode_value(&column(ColumnType::Bit), &[0x05]).unwrap(),
            Value::UInt(5)
        );
    }
}
