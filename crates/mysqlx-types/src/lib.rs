//! # mysqlx-types
//!
//! Document and row value model for X Protocol clients.
//!
//! This crate maps between the raw fields of a result set and Rust values,
//! and between Rust values and the scalars used for bound parameters.
//!
//! ## Type Mappings
//!
//! | Column type | Wire layout | [`Value`] |
//! |-------------|-------------|-----------|
//! | `SINT` | zigzag varint | `Int(i64)` |
//! | `UINT` | varint | `UInt(u64)` |
//! | `DOUBLE` | 8 bytes LE | `Double` |
//! | `FLOAT` | 4 bytes LE | `Double` (widened) |
//! | `BYTES` | bytes + `0x00` | `String`, `Bytes`, or parsed JSON |
//! | `TIME` | sign + varints | `Time(TimeDelta)` |
//! | `DATETIME` | varints | `Date` or `DateTime` |
//! | `SET` | varint-prefixed strings | `Array` of `String` |
//! | `ENUM` | bytes + `0x00` | `String` |
//! | `BIT` | varint | `UInt` |
//! | `DECIMAL` | scale + packed BCD + sign | `Decimal` |
//!
//! An empty field is always `NULL`.
//!
//! ## Documents
//!
//! [`DbDoc`] keeps keys in insertion order, which is also the order the
//! server returns them in.
//!
//! ```rust
//! use mysqlx_types::{DbDoc, Value};
//!
//! let doc = DbDoc::parse(r#"{"title": "Dune", "pages": 412}"#).unwrap();
//! assert_eq!(doc.get("pages"), Some(&Value::Int(412)));
//! assert_eq!(doc.to_json_string(), r#"{"title":"Dune","pages":412}"#);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_value;
pub mod scalar;
pub mod value;

pub use decode::{FieldDecode, decode_value};
pub use encode::{FieldEncode, encode_value, infer_column};
pub use error::TypeError;
pub use from_value::FromValue;
pub use value::{DbDoc, ID_FIELD, Value};
