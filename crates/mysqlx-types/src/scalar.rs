//! Conversions between [`Value`] and the protocol's `Scalar`/`Any`.
//!
//! Bound parameters travel as scalars. Arrays and documents are sent as
//! JSON-typed octets; temporal and decimal values as their text form.

use mysqlx_protocol::{Any, ContentType, ObjectField, Scalar};

use crate::error::TypeError;
use crate::value::{DbDoc, Value};

impl Value {
    /// Convert to a protocol scalar for binding.
    #[must_use]
    pub fn to_scalar(&self) -> Scalar {
        match self {
            Self::Null => Scalar::Null,
            Self::Bool(v) => Scalar::Bool(*v),
            Self::Int(v) => Scalar::SInt(*v),
            Self::UInt(v) => Scalar::UInt(*v),
            Self::Double(v) => Scalar::Double(*v),
            Self::String(v) => Scalar::String(v.clone()),
            Self::Bytes(v) => Scalar::Octets {
                value: v.clone(),
                content_type: ContentType::Plain,
            },
            Self::Array(_) | Self::Document(_) => Scalar::json(self.to_json().to_string()),
            Self::Decimal(_) | Self::Date(_) | Self::Time(_) | Self::DateTime(_) => {
                Scalar::String(self.to_text().unwrap_or_default())
            }
        }
    }

    /// Convert to a protocol `Any`, keeping arrays and documents structured.
    #[must_use]
    pub fn to_any(&self) -> Any {
        match self {
            Self::Array(items) => Any::Array(items.iter().map(Value::to_any).collect()),
            Self::Document(doc) => Any::Object(
                doc.iter()
                    .map(|(key, value)| ObjectField {
                        key: key.to_string(),
                        value: value.to_any(),
                    })
                    .collect(),
            ),
            _ => Any::Scalar(self.to_scalar()),
        }
    }

    /// Convert a protocol scalar back into a value.
    ///
    /// JSON octets are parsed into documents or arrays.
    pub fn from_scalar(scalar: &Scalar) -> Result<Self, TypeError> {
        Ok(match scalar {
            Scalar::Null => Self::Null,
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::SInt(v) => Self::Int(*v),
            Scalar::UInt(v) => Self::UInt(*v),
            Scalar::Double(v) => Self::Double(*v),
            Scalar::Float(v) => Self::Double(f64::from(*v)),
            Scalar::String(v) => Self::String(v.clone()),
            Scalar::Octets {
                value,
                content_type: ContentType::Json,
            } => {
                let json: serde_json::Value = serde_json::from_slice(value)
                    .map_err(|e| TypeError::InvalidJson(e.to_string()))?;
                Self::from(json)
            }
            Scalar::Octets { value, .. } => Self::Bytes(value.clone()),
        })
    }

    /// Convert a protocol `Any` back into a value.
    pub fn from_any(any: &Any) -> Result<Self, TypeError> {
        Ok(match any {
            Any::Scalar(scalar) => Self::from_scalar(scalar)?,
            Any::Array(items) => Self::Array(
                items
                    .iter()
                    .map(Value::from_any)
                    .collect::<Result<_, _>>()?,
            ),
            Any::Object(fields) => {
                let mut doc = DbDoc::new();
                for field in fields {
                    doc.set(field.key.clone(), Value::from_any(&field.value)?);
                }
                Self::Document(doc)
            }
        })
    }
}
