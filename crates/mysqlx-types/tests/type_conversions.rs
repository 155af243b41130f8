//! Field decoding and value conversion edge cases.
//!
//! Tests edge cases for:
//! - NULL handling
//! - Integer and varint boundaries
//! - Unicode in strings and documents
//! - Malformed fields

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::{Bytes, BytesMut};
use mysqlx_protocol::codec::{write_varint, zigzag_encode};
use mysqlx_protocol::{ColumnFlags, ColumnMetaData, ColumnType, ContentType};
use mysqlx_types::{DbDoc, FromValue, TypeError, Value, decode_value, encode_value, infer_column};
use proptest::prelude::*;

fn column(column_type: ColumnType) -> ColumnMetaData {
    ColumnMetaData::new(column_type, "c")
}

// ============================================================================
// NULL Handling
// ============================================================================

mod null_handling {
    use super::*;

    #[test]
    fn test_empty_field_is_null_for_every_type() {
        for ty in [
            ColumnType::SInt,
            ColumnType::UInt,
            ColumnType::Double,
            ColumnType::Float,
            ColumnType::Bytes,
            ColumnType::Time,
            ColumnType::DateTime,
            ColumnType::Set,
            ColumnType::Enum,
            ColumnType::Bit,
            ColumnType::Decimal,
        ] {
            assert!(decode_value(&column(ty), &[]).unwrap().is_null(), "{ty:?}");
        }
    }

    #[test]
    fn test_null_to_option() {
        let result = Option::<String>::from_value(&Value::Null).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_null_to_non_option_fails() {
        assert!(matches!(
            String::from_value(&Value::Null),
            Err(TypeError::UnexpectedNull)
        ));
    }

    #[test]
    fn test_json_null_inside_document() {
        let doc = DbDoc::parse(r#"{"a": null}"#).unwrap();
        assert_eq!(doc.get("a"), Some(&Value::Null));
        assert_eq!(doc.to_json_string(), r#"{"a":null}"#);
    }
}

// ============================================================================
// Integer Boundaries
// ============================================================================

mod integer_boundaries {
    use super::*;

    fn sint_field(v: i64) -> Bytes {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, zigzag_encode(v));
        buf.freeze()
    }

    #[test]
    fn test_i64_extremes() {
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            let value = decode_value(&column(ColumnType::SInt), &sint_field(v)).unwrap();
            assert_eq!(value, Value::Int(v));
        }
    }

    #[test]
    fn test_u64_max() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, u64::MAX);
        let value = decode_value(&column(ColumnType::UInt), &buf).unwrap();
        assert_eq!(value, Value::UInt(u64::MAX));
        assert!(matches!(
            i64::from_value(&value),
            Err(TypeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_varint_overflow_is_malformed() {
        let field = [0xff; 11];
        let err = decode_value(&column(ColumnType::UInt), &field).unwrap_err();
        assert!(matches!(err, TypeError::Malformed { .. }));
    }

    #[test]
    fn test_unterminated_varint_is_malformed() {
        let err = decode_value(&column(ColumnType::SInt), &[0x80, 0x80]).unwrap_err();
        assert!(matches!(err, TypeError::Malformed { .. }));
    }
}

// ============================================================================
// Strings and Documents
// ============================================================================

mod text {
    use super::*;

    #[test]
    fn test_unicode_round_trip() {
        for s in ["", "日本語", "emoji 🦀", "line\nbreak", "quote \" inside"] {
            let value = Value::from(s);
            let column = infer_column("s", &value);
            let field = encode_value(&value, &column).unwrap();
            assert_eq!(decode_value(&column, &field).unwrap(), value);
        }
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode_value(&column(ColumnType::Bytes), &[0xc3, 0x28, 0x00]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidEncoding(_)));
    }

    #[test]
    fn test_invalid_utf8_kept_for_binary_collation() {
        let mut binary = column(ColumnType::Bytes);
        binary.collation = 63;
        let value = decode_value(&binary, &[0xc3, 0x28, 0x00]).unwrap();
        assert_eq!(value.as_bytes(), Some(&[0xc3, 0x28][..]));
    }

    #[test]
    fn test_geometry_stays_binary() {
        let geometry = column(ColumnType::Bytes).with_content_type(ContentType::Geometry);
        let value = decode_value(&geometry, &[1, 2, 3, 0]).unwrap();
        assert_eq!(value, Value::Bytes(Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn test_malformed_json_document() {
        let json = column(ColumnType::Bytes).with_content_type(ContentType::Json);
        let err = decode_value(&json, b"{\"a\":\0").unwrap_err();
        assert!(matches!(err, TypeError::InvalidJson(_)));
    }

    #[test]
    fn test_document_order_preserved_through_field() {
        let json = column(ColumnType::Bytes).with_content_type(ContentType::Json);
        let value = decode_value(&json, b"{\"z\":1,\"a\":{\"y\":2,\"b\":3}}\0").unwrap();
        let doc = value.as_document().unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["z", "a"]);
        assert_eq!(value.to_string(), r#"{"z":1,"a":{"y":2,"b":3}}"#);
    }

    #[test]
    fn test_binary_flag() {
        let col = column(ColumnType::Bytes).with_flags(ColumnFlags::BINARY);
        assert!(decode_value(&col, b"ab\0").unwrap().as_bytes().is_some());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_sint_round_trip(v in any::<i64>()) {
        let col = column(ColumnType::SInt);
        let field = encode_value(&Value::Int(v), &col).unwrap();
        prop_assert_eq!(decode_value(&col, &field).unwrap(), Value::Int(v));
    }

    #[test]
    fn prop_decode_never_panics(ty in prop::sample::select(vec![
        ColumnType::SInt,
        ColumnType::UInt,
        ColumnType::Double,
        ColumnType::Float,
        ColumnType::Bytes,
        ColumnType::Time,
        ColumnType::DateTime,
        ColumnType::Set,
        ColumnType::Enum,
        ColumnType::Bit,
        ColumnType::Decimal,
    ]), field in prop::collection::vec(any::<u8>(), 0..32)) {
        let _ = decode_value(&column(ty), &field);
    }

    #[test]
    fn prop_string_round_trip(s in "\\PC*") {
        let value = Value::from(s);
        let col = infer_column("s", &value);
        let field = encode_value(&value, &col).unwrap();
        prop_assert_eq!(decode_value(&col, &field).unwrap(), value);
    }
}
