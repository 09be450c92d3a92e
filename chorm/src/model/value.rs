//! Normalized values used in conditions
//!
//! A [`Value`] is what field providers normalize raw caller input into and
//! what they format as SQL literals.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::utils::sql::{NULL_LITERAL, comma_join, escape_string};

/// Value rejected by a field provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(String);

impl ValueError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Error for a value whose kind the field cannot accept
    pub fn unexpected(expected: &str, got: &Value) -> Self {
        Self(format!("expected {}, got {} {}", expected, got.kind(), got))
    }
}

/// A scalar or array value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Format as a ClickHouse literal
    ///
    /// Strings, dates and date-times are quoted only when `quote` is true.
    /// Array elements are always quoted.
    pub fn to_db_string(&self, quote: bool) -> String {
        match self {
            Value::Null => NULL_LITERAL.to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => escape_string(s, quote),
            Value::Date(d) => escape_string(&d.format("%Y-%m-%d").to_string(), quote),
            Value::DateTime(dt) => {
                escape_string(&dt.format("%Y-%m-%d %H:%M:%S").to_string(), quote)
            }
            Value::Array(items) => format!(
                "[{}]",
                comma_join(items.iter().map(|v| v.to_db_string(true)))
            ),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string(true))
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::UInt(v as u64)
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::Array(v.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Value::Null.to_db_string(true), "\\N");
        assert_eq!(Value::Bool(true).to_db_string(true), "1");
        assert_eq!(Value::Int(-7).to_db_string(true), "-7");
        assert_eq!(Value::UInt(u64::MAX).to_db_string(true), "18446744073709551615");
        assert_eq!(Value::Float(1.5).to_db_string(true), "1.5");
        assert_eq!(Value::Float(f64::NAN).to_db_string(true), "nan");
    }

    #[test]
    fn test_string_literal_quoting() {
        let v = Value::from("it's");
        assert_eq!(v.to_db_string(true), "'it\\'s'");
        assert_eq!(v.to_db_string(false), "it\\'s");
    }

    #[test]
    fn test_date_literals() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(Value::from(d).to_db_string(true), "'2020-01-31'");

        let dt = Utc.with_ymd_and_hms(2020, 1, 31, 8, 30, 0).unwrap();
        assert_eq!(Value::from(dt).to_db_string(false), "2020-01-31 08:30:00");
    }

    #[test]
    fn test_array_literal_quotes_elements() {
        let v = Value::from(vec!["a", "b"]);
        assert_eq!(v.to_db_string(false), "['a', 'b']");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn test_value_error_unexpected() {
        let err = ValueError::unexpected("integer", &Value::from("x"));
        assert_eq!(err.to_string(), "expected integer, got string 'x'");
    }
}
