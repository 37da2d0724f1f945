//! Dynamically typed SQL values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SqlType;

/// A single SQL value, as bound to a statement or read back from a row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// Double precision float.
    Double(f64),
    /// Decimal, kept as its textual representation.
    Decimal(String),
    /// Text.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Whether this is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text content, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view of the value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int(i) => Some(f64::from(*i)),
            Value::BigInt(i) => Some(*i as f64),
            Value::Decimal(s) | Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::BigInt(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Convert a value read from a driver into the shape declared by `sql_type`.
    ///
    /// Drivers report storage classes (SQLite returns every integer as 64 bit,
    /// booleans as integers); this brings them back to the declared type.
    /// Values that cannot be converted are returned unchanged.
    pub fn coerce(self, sql_type: SqlType) -> Value {
        match (sql_type, self) {
            (_, Value::Null) => Value::Null,
            (SqlType::Boolean, v) => match v.as_bool() {
                Some(b) => Value::Bool(b),
                None => v,
            },
            (SqlType::Integer, Value::BigInt(i)) => match i32::try_from(i) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::BigInt(i),
            },
            (SqlType::BigInt | SqlType::Timestamp, Value::Int(i)) => Value::BigInt(i64::from(i)),
            (SqlType::Double, Value::Int(i)) => Value::Double(f64::from(i)),
            (SqlType::Double, Value::BigInt(i)) => Value::Double(i as f64),
            (SqlType::Decimal, Value::Text(s)) => Value::Decimal(s),
            (SqlType::Decimal, Value::Double(f)) => Value::Decimal(f.to_string()),
            (SqlType::Decimal, Value::BigInt(i)) => Value::Decimal(i.to_string()),
            (SqlType::Json, Value::Text(s)) => match serde_json::from_str(&s) {
                Ok(json) => Value::Json(json),
                Err(_) => Value::Text(s),
            },
            (_, v) => v,
        }
    }

    /// JSON representation, used by map-shaped query results.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::BigInt(i) => serde_json::Value::from(*i),
            Value::Double(f) => serde_json::Value::from(*f),
            Value::Decimal(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
            Value::Json(j) => j.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Decimal(s) | Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_sqlite_integers() {
        assert_eq!(Value::BigInt(5).coerce(SqlType::Integer), Value::Int(5));
        assert_eq!(Value::BigInt(1).coerce(SqlType::Boolean), Value::Bool(true));
        assert_eq!(Value::BigInt(0).coerce(SqlType::Boolean), Value::Bool(false));
        assert_eq!(
            Value::BigInt(i64::MAX).coerce(SqlType::Integer),
            Value::BigInt(i64::MAX)
        );
    }

    #[test]
    fn test_coerce_keeps_null_and_text() {
        assert_eq!(Value::Null.coerce(SqlType::Integer), Value::Null);
        assert_eq!(
            Value::Text("2024-01-02".into()).coerce(SqlType::Date),
            Value::Text("2024-01-02".into())
        );
    }

    #[test]
    fn test_coerce_json_text() {
        let v = Value::Text("{\"a\":1}".into()).coerce(SqlType::Json);
        assert_eq!(v, Value::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
