//! Scalar and `Any` values carried by expressions, arguments and capabilities.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    MAX_NESTING_DEPTH, read_field, required, write_bool_field, write_bytes_field,
    write_double_field, write_float_field, write_message_field, write_sint_field,
    write_string_field, write_uint_field,
};
use crate::error::ProtocolError;
use crate::resultset::ContentType;

/// A single protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Signed integer.
    SInt(i64),
    /// Unsigned integer.
    UInt(u64),
    /// SQL `NULL`.
    Null,
    /// Opaque bytes tagged with a content type (JSON, geometry, XML, plain).
    Octets {
        /// Bytes.
        value: Bytes,
        /// How the server should interpret the bytes.
        content_type: ContentType,
    },
    /// 64-bit float.
    Double(f64),
    /// 32-bit float.
    Float(f32),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
}

impl Scalar {
    const SINT: u64 = 1;
    const UINT: u64 = 2;
    const NULL: u64 = 3;
    const OCTETS: u64 = 4;
    const DOUBLE: u64 = 5;
    const FLOAT: u64 = 6;
    const BOOL: u64 = 7;
    const STRING: u64 = 8;

    /// JSON text carried as octets.
    #[must_use]
    pub fn json(text: impl Into<String>) -> Self {
        Self::Octets {
            value: Bytes::from(text.into()),
            content_type: ContentType::Json,
        }
    }

    /// Name of the variant, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SInt(_) => "sint",
            Self::UInt(_) => "uint",
            Self::Null => "null",
            Self::Octets { .. } => "octets",
            Self::Double(_) => "double",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
        }
    }

    /// Encode the scalar as a `Mysqlx.Datatypes.Scalar` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::SInt(v) => {
                write_uint_field(dst, 1, Self::SINT);
                write_sint_field(dst, 2, *v);
            }
            Self::UInt(v) => {
                write_uint_field(dst, 1, Self::UINT);
                write_uint_field(dst, 3, *v);
            }
            Self::Null => write_uint_field(dst, 1, Self::NULL),
            Self::Octets {
                value,
                content_type,
            } => {
                write_uint_field(dst, 1, Self::OCTETS);
                write_message_field(dst, 5, |b| {
                    write_bytes_field(b, 1, value);
                    if *content_type != ContentType::Plain {
                        write_uint_field(b, 2, *content_type as u64);
                    }
                });
            }
            Self::Double(v) => {
                write_uint_field(dst, 1, Self::DOUBLE);
                write_double_field(dst, 6, *v);
            }
            Self::Float(v) => {
                write_uint_field(dst, 1, Self::FLOAT);
                write_float_field(dst, 7, *v);
            }
            Self::Bool(v) => {
                write_uint_field(dst, 1, Self::BOOL);
                write_bool_field(dst, 8, *v);
            }
            Self::String(v) => {
                write_uint_field(dst, 1, Self::STRING);
                write_message_field(dst, 9, |b| write_string_field(b, 1, v));
            }
        }
    }

    /// Decode a `Mysqlx.Datatypes.Scalar` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut kind = None;
        let mut signed = 0i64;
        let mut unsigned = 0u64;
        let mut octets = None;
        let mut double = 0f64;
        let mut float = 0f32;
        let mut boolean = false;
        let mut string = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => kind = Some(field.as_u64()?),
                2 => signed = field.as_sint()?,
                3 => unsigned = field.as_u64()?,
                5 => octets = Some(decode_octets(&mut field.into_bytes()?)?),
                6 => double = field.as_f64()?,
                7 => float = field.as_f32()?,
                8 => boolean = field.as_bool()?,
                9 => string = Some(decode_string(&mut field.into_bytes()?)?),
                _ => {}
            }
        }
        match required(kind, "Scalar.type")? {
            Self::SINT => Ok(Self::SInt(signed)),
            Self::UINT => Ok(Self::UInt(unsigned)),
            Self::NULL => Ok(Self::Null),
            Self::OCTETS => {
                let (value, content_type) = required(octets, "Scalar.v_octets")?;
                Ok(Self::Octets {
                    value,
                    content_type,
                })
            }
            Self::DOUBLE => Ok(Self::Double(double)),
            Self::FLOAT => Ok(Self::Float(float)),
            Self::BOOL => Ok(Self::Bool(boolean)),
            Self::STRING => Ok(Self::String(required(string, "Scalar.v_string")?)),
            other => Err(ProtocolError::InvalidTag {
                field: "scalar",
                value: other as u32,
            }),
        }
    }
}

fn decode_octets(src: &mut impl Buf) -> Result<(Bytes, ContentType), ProtocolError> {
    let mut value = Bytes::new();
    let mut content_type = ContentType::Plain;
    while src.has_remaining() {
        let field = read_field(src)?;
        match field.number {
            1 => value = field.into_bytes()?,
            2 => content_type = ContentType::from_u32(field.as_u32()?)?,
            _ => {}
        }
    }
    Ok((value, content_type))
}

// The collation field is ignored; the client only exchanges UTF-8 text.
fn decode_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let mut value = String::new();
    while src.has_remaining() {
        let field = read_field(src)?;
        if field.number == 1 {
            value = field.into_string("scalar string")?;
        }
    }
    Ok(value)
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::SInt(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// One key/value pair of an [`Any::Object`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    /// Key.
    pub key: String,
    /// Value.
    pub value: Any,
}

/// A scalar, object or array; used for capabilities and statement arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Any {
    /// Single value.
    Scalar(Scalar),
    /// Ordered key/value pairs.
    Object(Vec<ObjectField>),
    /// Ordered values.
    Array(Vec<Any>),
}

impl Any {
    const SCALAR: u64 = 1;
    const OBJECT: u64 = 2;
    const ARRAY: u64 = 3;

    /// Look up a key if this is an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Any> {
        match self {
            Self::Object(fields) => fields.iter().find(|f| f.key == key).map(|f| &f.value),
            _ => None,
        }
    }

    /// The inner scalar, if this is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The string value, if this is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean scalar.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Encode the value as a `Mysqlx.Datatypes.Any` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Scalar(s) => {
                write_uint_field(dst, 1, Self::SCALAR);
                write_message_field(dst, 2, |b| s.encode(b));
            }
            Self::Object(fields) => {
                write_uint_field(dst, 1, Self::OBJECT);
                write_message_field(dst, 3, |obj| {
                    for f in fields {
                        write_message_field(obj, 1, |b| {
                            write_string_field(b, 1, &f.key);
                            write_message_field(b, 2, |v| f.value.encode(v));
                        });
                    }
                });
            }
            Self::Array(items) => {
                write_uint_field(dst, 1, Self::ARRAY);
                write_message_field(dst, 4, |arr| {
                    for item in items {
                        write_message_field(arr, 1, |b| item.encode(b));
                    }
                });
            }
        }
    }

    /// Decode a `Mysqlx.Datatypes.Any` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Self::decode_at(src, 0)
    }

    fn decode_at(src: &mut impl Buf, depth: usize) -> Result<Self, ProtocolError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let mut kind = None;
        let mut scalar = None;
        let mut object = None;
        let mut array = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => kind = Some(field.as_u64()?),
                2 => scalar = Some(Scalar::decode(&mut field.into_bytes()?)?),
                3 => object = Some(Self::decode_object(&mut field.into_bytes()?, depth)?),
                4 => array = Some(Self::decode_array(&mut field.into_bytes()?, depth)?),
                _ => {}
            }
        }
        match required(kind, "Any.type")? {
            Self::SCALAR => Ok(Self::Scalar(required(scalar, "Any.scalar")?)),
            Self::OBJECT => Ok(Self::Object(object.unwrap_or_default())),
            Self::ARRAY => Ok(Self::Array(array.unwrap_or_default())),
            other => Err(ProtocolError::InvalidTag {
                field: "any",
                value: other as u32,
            }),
        }
    }

    fn decode_object(src: &mut impl Buf, depth: usize) -> Result<Vec<ObjectField>, ProtocolError> {
        let mut fields = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number != 1 {
                continue;
            }
            let mut body = field.into_bytes()?;
            let mut key = None;
            let mut value = None;
            while body.has_remaining() {
                let f = read_field(&mut body)?;
                match f.number {
                    1 => key = Some(f.into_string("object key")?),
                    2 => value = Some(Self::decode_at(&mut f.into_bytes()?, depth + 1)?),
                    _ => {}
                }
            }
            fields.push(ObjectField {
                key: required(key, "ObjectField.key")?,
                value: required(value, "ObjectField.value")?,
            });
        }
        Ok(fields)
    }

    fn decode_array(src: &mut impl Buf, depth: usize) -> Result<Vec<Any>, ProtocolError> {
        let mut items = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                items.push(Self::decode_at(&mut field.into_bytes()?, depth + 1)?);
            }
        }
        Ok(items)
    }
}

impl From<Scalar> for Any {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_scalar_encoding_layout() {
        let mut buf = BytesMut::new();
        Scalar::SInt(-2).encode(&mut buf);
        // type = V_SINT, v_signed_int = zigzag(-2)
        assert_eq!(&buf[..], &[0x08, 0x01, 0x10, 0x03]);

        let mut cursor = buf.freeze();
        assert_eq!(Scalar::decode(&mut cursor).unwrap(), Scalar::SInt(-2));
    }

    #[test]
    fn test_scalar_string_is_nested() {
        let mut buf = BytesMut::new();
        Scalar::from("hi").encode(&mut buf);
        assert_eq!(&buf[..], &[0x08, 0x08, 0x4a, 0x04, 0x0a, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_scalar_string_with_collation() {
        // V_STRING with collation 255 after the value, as servers send it
        let wire = [0x08, 0x08, 0x4a, 0x07, 0x0a, 0x02, b'o', b'k', 0x10, 0xff, 0x01];
        let decoded = Scalar::decode(&mut Bytes::copy_from_slice(&wire)).unwrap();
        assert_eq!(decoded, Scalar::from("ok"));
    }

    #[test]
    fn test_scalar_octets_content_type() {
        let mut buf = BytesMut::new();
        Scalar::json("{}").encode(&mut buf);
        assert_eq!(
            Scalar::decode(&mut buf.freeze()).unwrap(),
            Scalar::json("{}")
        );
    }

    #[test]
    fn test_scalar_invalid_tag() {
        let mut cursor = Bytes::from_static(&[0x08, 42]);
        assert!(matches!(
            Scalar::decode(&mut cursor),
            Err(ProtocolError::InvalidTag { field: "scalar", value: 42 })
        ));
    }

    #[test]
    fn test_scalar_missing_type() {
        let mut cursor = Bytes::from_static(&[0x18, 0x05]);
        assert_eq!(
            Scalar::decode(&mut cursor),
            Err(ProtocolError::MissingField("Scalar.type"))
        );
    }

    #[test]
    fn test_any_object_lookup() {
        let caps = Any::Object(vec![
            ObjectField {
                key: "tls".into(),
                value: Any::Scalar(Scalar::Bool(true)),
            },
            ObjectField {
                key: "mechanisms".into(),
                value: Any::Array(vec![Any::Scalar(Scalar::from("PLAIN"))]),
            },
        ]);

        let mut buf = BytesMut::new();
        caps.encode(&mut buf);
        let decoded = Any::decode(&mut buf.freeze()).unwrap();

        assert_eq!(decoded.get("tls").and_then(Any::as_bool), Some(true));
        assert!(decoded.get("missing").is_none());
    }

    #[test]
    fn test_any_nesting_limit() {
        let mut value = Any::Scalar(Scalar::Null);
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            value = Any::Array(vec![value]);
        }
        let mut buf = BytesMut::new();
        value.encode(&mut buf);

        assert_eq!(
            Any::decode(&mut buf.freeze()),
            Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }
}
