//! Protobuf wire-format primitives for X Protocol message bodies.
//!
//! Every message payload is a sequence of fields. Each field starts with a
//! varint key `(number << 3) | wire_type` followed by:
//!
//! - wire type 0: a varint (integers, enums, booleans);
//! - wire type 1: eight little-endian bytes (`double`);
//! - wire type 2: a varint length and that many bytes (strings, blobs,
//!   nested messages);
//! - wire type 5: four little-endian bytes (`float`).
//!
//! Decoders accept fields in any order, skip unknown field numbers, and let
//! a repeated occurrence of a singular field overwrite the earlier one.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Maximum nesting depth accepted when decoding recursive structures.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Varint wire type.
pub const WIRE_VARINT: u8 = 0;
/// Eight-byte little-endian wire type.
pub const WIRE_FIXED64: u8 = 1;
/// Length-delimited wire type.
pub const WIRE_LEN: u8 = 2;
/// Four-byte little-endian wire type.
pub const WIRE_FIXED32: u8 = 5;

#[inline]
fn ensure(src: &impl Buf, len: usize) -> Result<(), ProtocolError> {
    if src.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(())
}

/// The value part of a decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Wire type 0.
    Varint(u64),
    /// Wire type 1.
    Fixed64(u64),
    /// Wire type 2.
    Bytes(Bytes),
    /// Wire type 5.
    Fixed32(u32),
}

impl FieldValue {
    const fn wire_type(&self) -> u8 {
        match self {
            Self::Varint(_) => WIRE_VARINT,
            Self::Fixed64(_) => WIRE_FIXED64,
            Self::Bytes(_) => WIRE_LEN,
            Self::Fixed32(_) => WIRE_FIXED32,
        }
    }
}

/// A single decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field number from the schema.
    pub number: u32,
    /// Raw value.
    pub value: FieldValue,
}

impl Field {
    fn mismatch(&self, expected: u8) -> ProtocolError {
        ProtocolError::WireTypeMismatch {
            field: self.number,
            expected,
            actual: self.value.wire_type(),
        }
    }

    /// Read a varint-encoded `uint64`, `uint32`, or enum value.
    pub fn as_u64(&self) -> Result<u64, ProtocolError> {
        match self.value {
            FieldValue::Varint(v) => Ok(v),
            _ => Err(self.mismatch(WIRE_VARINT)),
        }
    }

    /// Read a `uint32` or enum value.
    ///
    /// Values wider than 32 bits are truncated, as protobuf does.
    pub fn as_u32(&self) -> Result<u32, ProtocolError> {
        self.as_u64().map(|v| v as u32)
    }

    /// Read a zigzag-encoded `sint64`.
    pub fn as_sint(&self) -> Result<i64, ProtocolError> {
        self.as_u64().map(zigzag_decode)
    }

    /// Read a `bool`.
    pub fn as_bool(&self) -> Result<bool, ProtocolError> {
        self.as_u64().map(|v| v != 0)
    }

    /// Read a `double`.
    pub fn as_f64(&self) -> Result<f64, ProtocolError> {
        match self.value {
            FieldValue::Fixed64(v) => Ok(f64::from_bits(v)),
            _ => Err(self.mismatch(WIRE_FIXED64)),
        }
    }

    /// Read a `float`.
    pub fn as_f32(&self) -> Result<f32, ProtocolError> {
        match self.value {
            FieldValue::Fixed32(v) => Ok(f32::from_bits(v)),
            _ => Err(self.mismatch(WIRE_FIXED32)),
        }
    }

    /// Take a `bytes` value or the body of a nested message.
    pub fn into_bytes(self) -> Result<Bytes, ProtocolError> {
        match self.value {
            FieldValue::Bytes(b) => Ok(b),
            _ => Err(self.mismatch(WIRE_LEN)),
        }
    }

    /// Take a `string` value.
    ///
    /// `name` identifies the field in the error if the bytes are not valid UTF-8.
    pub fn into_string(self, name: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.into_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(name))
    }
}

/// Read the next field from a message body.
pub fn read_field(src: &mut impl Buf) -> Result<Field, ProtocolError> {
    let key = read_varint(src)?;
    let number = (key >> 3) as u32;
    let wire_type = (key & 0x07) as u8;
    let value = match wire_type {
        WIRE_VARINT => FieldValue::Varint(read_varint(src)?),
        WIRE_FIXED64 => {
            ensure(src, 8)?;
            FieldValue::Fixed64(src.get_u64_le())
        }
        WIRE_LEN => {
            let len =
                usize::try_from(read_varint(src)?).map_err(|_| ProtocolError::UnexpectedEof)?;
            ensure(src, len)?;
            FieldValue::Bytes(src.copy_to_bytes(len))
        }
        WIRE_FIXED32 => {
            ensure(src, 4)?;
            FieldValue::Fixed32(src.get_u32_le())
        }
        _ => return Err(ProtocolError::InvalidWireType { field: number, wire_type }),
    };
    Ok(Field { number, value })
}

/// Consume a whole message body, ignoring its fields.
///
/// Used for messages with no fields this client reads.
pub fn skip_message(src: &mut impl Buf) -> Result<(), ProtocolError> {
    while src.has_remaining() {
        read_field(src)?;
    }
    Ok(())
}

/// Unwrap a required field, naming it in the error.
pub fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ProtocolError> {
    value.ok_or(ProtocolError::MissingField(name))
}

/// Write a field key.
pub fn write_key(dst: &mut impl BufMut, number: u32, wire_type: u8) {
    write_varint(dst, (u64::from(number) << 3) | u64::from(wire_type));
}

/// Write a `uint64`, `uint32`, or enum field.
pub fn write_uint_field(dst: &mut impl BufMut, number: u32, value: u64) {
    write_key(dst, number, WIRE_VARINT);
    write_varint(dst, value);
}

/// Write a zigzag-encoded `sint64` field.
pub fn write_sint_field(dst: &mut impl BufMut, number: u32, value: i64) {
    write_uint_field(dst, number, zigzag_encode(value));
}

/// Write a `bool` field.
pub fn write_bool_field(dst: &mut impl BufMut, number: u32, value: bool) {
    write_uint_field(dst, number, u64::from(value));
}

/// Write a `double` field.
pub fn write_double_field(dst: &mut impl BufMut, number: u32, value: f64) {
    write_key(dst, number, WIRE_FIXED64);
    dst.put_u64_le(value.to_bits());
}

/// Write a `float` field.
pub fn write_float_field(dst: &mut impl BufMut, number: u32, value: f32) {
    write_key(dst, number, WIRE_FIXED32);
    dst.put_u32_le(value.to_bits());
}

/// Write a `bytes` field.
pub fn write_bytes_field(dst: &mut impl BufMut, number: u32, value: &[u8]) {
    write_key(dst, number, WIRE_LEN);
    write_varint(dst, value.len() as u64);
    dst.put_slice(value);
}

/// Write a `string` field.
pub fn write_string_field(dst: &mut impl BufMut, number: u32, value: &str) {
    write_bytes_field(dst, number, value.as_bytes());
}

/// Write a nested message field.
///
/// The body is encoded into a scratch buffer first since its length prefix
/// comes before it.
pub fn write_message_field<F>(dst: &mut impl BufMut, number: u32, encode: F)
where
    F: FnOnce(&mut BytesMut),
{
    let mut body = BytesMut::new();
    encode(&mut body);
    write_bytes_field(dst, number, &body);
}

/// Read an unsigned LEB128 varint.
pub fn read_varint(src: &mut impl Buf) -> Result<u64, ProtocolError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        ensure(src, 1)?;
        let byte = src.get_u8();
        if shift == 63 && byte > 1 {
            return Err(ProtocolError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(ProtocolError::VarintOverflow);
        }
    }
}

/// Write an unsigned LEB128 varint.
pub fn write_varint(dst: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Map a signed integer onto an unsigned one so small magnitudes stay short.
#[must_use]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_field_keys() {
        let mut buf = BytesMut::new();
        write_uint_field(&mut buf, 1, 150);
        write_string_field(&mut buf, 2, "testing");
        // Canonical encodings from the protobuf encoding guide.
        assert_eq!(&buf[..3], &[0x08, 0x96, 0x01]);
        assert_eq!(&buf[3..5], &[0x12, 0x07]);
        assert_eq!(&buf[5..], b"testing");

        let mut cursor = buf.freeze();
        let first = read_field(&mut cursor).unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.as_u64().unwrap(), 150);
        let second = read_field(&mut cursor).unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(second.into_string("s").unwrap(), "testing");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_fixed_width_fields() {
        let mut buf = BytesMut::new();
        write_double_field(&mut buf, 6, 1.5);
        write_float_field(&mut buf, 7, -0.25);
        assert_eq!(buf[0], (6 << 3) | WIRE_FIXED64);
        assert_eq!(buf[9], (7 << 3) | WIRE_FIXED32);

        let mut cursor = buf.freeze();
        assert_eq!(read_field(&mut cursor).unwrap().as_f64().unwrap(), 1.5);
        assert_eq!(read_field(&mut cursor).unwrap().as_f32().unwrap(), -0.25);
    }

    #[test]
    fn test_sint_uses_zigzag() {
        let mut buf = BytesMut::new();
        write_sint_field(&mut buf, 2, -1);
        assert_eq!(&buf[..], &[0x10, 0x01]);
        let field = read_field(&mut Bytes::from(buf.to_vec())).unwrap();
        assert_eq!(field.as_sint().unwrap(), -1);
    }

    #[test]
    fn test_nested_message_length_prefix() {
        let mut buf = BytesMut::new();
        write_message_field(&mut buf, 3, |b| write_uint_field(b, 1, 1));
        assert_eq!(&buf[..], &[0x1a, 0x02, 0x08, 0x01]);
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = BytesMut::new();
        write_bytes_field(&mut buf, 1, &[0xff, 0xfe]);
        let field = read_field(&mut buf.freeze()).unwrap();
        assert_eq!(field.into_string("name"), Err(ProtocolError::InvalidUtf8("name")));
    }

    #[test]
    fn test_length_past_end() {
        let mut cursor = Bytes::from_static(&[0x0a, 0x0a, b'a', b'b', b'c']);
        assert_eq!(read_field(&mut cursor), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_group_wire_types_rejected() {
        let mut cursor = Bytes::from_static(&[0x0b]);
        assert_eq!(
            read_field(&mut cursor),
            Err(ProtocolError::InvalidWireType {
                field: 1,
                wire_type: 3
            })
        );
    }

    #[test]
    fn test_wire_type_mismatch() {
        let mut buf = BytesMut::new();
        write_uint_field(&mut buf, 4, 7);
        let field = read_field(&mut buf.freeze()).unwrap();
        assert_eq!(
            field.into_bytes(),
            Err(ProtocolError::WireTypeMismatch {
                field: 4,
                expected: WIRE_LEN,
                actual: WIRE_VARINT
            })
        );
    }

    #[test]
    fn test_skip_message() {
        let mut buf = BytesMut::new();
        write_uint_field(&mut buf, 9, 1);
        write_bytes_field(&mut buf, 10, b"ignored");
        write_double_field(&mut buf, 11, 0.0);
        let mut cursor = buf.freeze();
        skip_message(&mut cursor).unwrap();
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_varint_known_values() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 300);
        assert_eq!(&buf[..], &[0xac, 0x02]);

        let mut cursor = buf.freeze();
        assert_eq!(read_varint(&mut cursor).unwrap(), 300);
    }

    #[test]
    fn test_varint_overflow() {
        let mut cursor = Bytes::from_static(&[0xff; 11]);
        assert_eq!(read_varint(&mut cursor), Err(ProtocolError::VarintOverflow));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MAX)), i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_varint_decodes_what_was_written(value in any::<u64>()) {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            prop_assert!(buf.len() <= 10);
            let mut cursor = buf.freeze();
            prop_assert_eq!(read_varint(&mut cursor).unwrap(), value);
            prop_assert_eq!(cursor.remaining(), 0);
        }

        #[test]
        fn prop_read_field_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut cursor = Bytes::from(bytes);
            let _ = skip_message(&mut cursor);
        }
    }
}
