//! Document and row value representation.

use std::fmt;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Name of the document key that holds the document id.
pub const ID_FIELD: &str = "_id";

/// A value read from a document or a table row, or bound as a parameter.
///
/// Documents and arrays nest; every other variant is a scalar.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Double(f64),
    /// UTF-8 text.
    String(String),
    /// Raw bytes (binary columns, geometry, XML).
    Bytes(Bytes),
    /// Exact decimal.
    Decimal(Decimal),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day or signed duration.
    Time(TimeDelta),
    /// Date and time without time zone.
    DateTime(NaiveDateTime),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Document with ordered keys.
    Document(DbDoc),
}

impl Value {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Int(_) => "SINT",
            Self::UInt(_) => "UINT",
            Self::Double(_) => "DOUBLE",
            Self::String(_) => "STRING",
            Self::Bytes(_) => "BYTES",
            Self::Decimal(_) => "DECIMAL",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "DATETIME",
            Self::Array(_) => "ARRAY",
            Self::Document(_) => "DOCUMENT",
        }
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, if it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as a u64, if it fits.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Get the elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Get the document, if this is one.
    #[must_use]
    pub fn as_document(&self) -> Option<&DbDoc> {
        match self {
            Self::Document(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a key, if this is a document.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_document().and_then(|doc| doc.get(key))
    }

    /// Convert to a JSON value.
    ///
    /// Temporal values become strings in the server's text format. Bytes
    /// become a string with invalid UTF-8 replaced.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::Int(v) => Json::from(*v),
            Self::UInt(v) => Json::from(*v),
            Self::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Self::String(v) => Json::String(v.clone()),
            Self::Bytes(v) => Json::String(String::from_utf8_lossy(v).into_owned()),
            Self::Decimal(v) => v
                .to_string()
                .parse::<serde_json::Number>()
                .map_or_else(|_| Json::String(v.to_string()), Json::Number),
            Self::Date(_) | Self::Time(_) | Self::DateTime(_) => {
                Json::String(self.to_text().unwrap_or_default())
            }
            Self::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Document(doc) => doc.to_json(),
        }
    }

    /// Render scalar values in the server's text format.
    ///
    /// Returns `None` for NULL, arrays and documents.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::Array(_) | Self::Document(_) => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::UInt(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            Self::Decimal(v) => Some(v.to_string()),
            Self::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            Self::Time(v) => Some(format_time(*v)),
            Self::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }
}

/// Format a duration as `[-]HH:MM:SS[.ffffff]`.
fn format_time(delta: TimeDelta) -> String {
    let total = delta.num_microseconds().unwrap_or(0);
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();

    let micros = total % 1_000_000;
    let secs = total / 1_000_000;
    let (hours, minutes, seconds) = (secs / 3600, (secs / 60) % 60, secs % 60);

    if micros == 0 {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(v) => Self::Bool(v),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(v) => Self::String(v),
            Json::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Self::Document(DbDoc {
                fields: map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            }),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(<$target>::from(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool as bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Double as f64,
    f64 => Double as f64,
    String => String as String,
    &str => String as String,
    Bytes => Bytes as Bytes,
    Decimal => Decimal as Decimal,
    NaiveDate => Date as NaiveDate,
    NaiveDateTime => DateTime as NaiveDateTime,
    TimeDelta => Time as TimeDelta,
    DbDoc => Document as DbDoc,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// A document: keys in insertion order mapped to values.
///
/// Keys are unique; [`DbDoc::set`] replaces an existing key in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbDoc {
    fields: Vec<(String, Value)>,
}

impl DbDoc {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from JSON text.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TypeError::InvalidJson(e.to_string()))?;
        Self::from_json(json)
    }

    /// Build a document from a JSON value, which must be an object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, TypeError> {
        match Value::from(json) {
            Value::Document(doc) => Ok(doc),
            other => Err(TypeError::TypeMismatch {
                expected: "DOCUMENT",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Build a document from any serializable struct or map.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, TypeError> {
        let json = serde_json::to_value(value).map_err(|e| TypeError::InvalidJson(e.to_string()))?;
        Self::from_json(json)
    }

    /// Deserialize the document into a caller type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        serde_json::from_value(self.to_json()).map_err(|e| TypeError::InvalidJson(e.to_string()))
    }

    /// Add or replace a key, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Add or replace a key. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a key for modification.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The document id (`_id`), if present.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_FIELD)
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Key/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Compact JSON text, keys in document order.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

impl fmt::Display for DbDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

impl std::str::FromStr for DbDoc {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DbDoc {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Self::new();
        for (k, v) in iter {
            doc.set(k, v);
        }
        doc
    }
}

impl IntoIterator for DbDoc {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for DbDoc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DbDoc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(json).map_err(serde::de::Error::custom)
    }
}
