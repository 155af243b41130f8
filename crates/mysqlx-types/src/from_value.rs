//! Trait for converting decoded values to Rust types.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::value::{DbDoc, Value};

/// Trait for types that can be extracted from a [`Value`].
///
/// Implemented for common Rust types so rows and documents can be read
/// with `row.get::<T>(..)`.
pub trait FromValue: Sized {
    /// Convert from a value to this type.
    fn from_value(value: &Value) -> Result<Self, TypeError>;

    /// Convert from a possibly NULL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_value_nullable(value: &Value) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_value(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &Value) -> TypeError {
    match value {
        Value::Null => TypeError::UnexpectedNull,
        _ => TypeError::TypeMismatch {
            expected,
            actual: value.type_name().to_string(),
        },
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            Value::UInt(v) => Ok(*v != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, TypeError> {
                    let out_of_range = || TypeError::OutOfRange {
                        target_type: stringify!($ty),
                    };
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        Value::UInt(v) => <$ty>::try_from(*v).map_err(|_| out_of_range()),
                        Value::Bool(v) => Ok(<$ty>::from(*v)),
                        _ => Err(mismatch(stringify!($ty), value)),
                    }
                }
            }
        )*
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Double(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(v) => Ok(v.clone()),
            Value::Bytes(b) => String::from_utf8(b.to_vec())
                .map_err(|e| TypeError::InvalidEncoding(e.to_string())),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::String(s) => Ok(Bytes::from(s.clone().into_bytes())),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Decimal(v) => Ok(*v),
            Value::Int(v) => Ok(Decimal::from(*v)),
            Value::UInt(v) => Ok(Decimal::from(*v)),
            Value::String(s) => s
                .parse()
                .map_err(|e| TypeError::InvalidDecimal(format!("{e}"))),
            _ => Err(mismatch("Decimal", value)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Date(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.date()),
            _ => Err(mismatch("NaiveDate", value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::Date(v) => v
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| TypeError::InvalidDateTime(v.to_string())),
            _ => Err(mismatch("NaiveDateTime", value)),
        }
    }
}

impl FromValue for TimeDelta {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Time(v) => Ok(*v),
            _ => Err(mismatch("TimeDelta", value)),
        }
    }
}

impl FromValue for DbDoc {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Document(doc) => Ok(doc.clone()),
            Value::String(s) => DbDoc::parse(s),
            _ => Err(mismatch("DbDoc", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        Ok(value.to_json())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => Err(mismatch("Vec", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        T::from_value_nullable(value)
    }
}
