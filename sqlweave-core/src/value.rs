//! Value types for template variables and bound SQL arguments

use serde::{Deserialize, Serialize};

/// A value that can live in an environment and be bound as a SQL argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String value
    String(String),
    /// Bytes value
    Bytes(Vec<u8>),
    /// JSON value
    Json(serde_json::Value),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the SQL type name for this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::I32(_) => "INTEGER",
            Value::I64(_) => "BIGINT",
            Value::F32(_) => "REAL",
            Value::F64(_) => "DOUBLE PRECISION",
            Value::String(_) => "TEXT",
            Value::Bytes(_) => "BYTEA",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
        }
    }

    /// The boolean payload, if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(i) => Some(i64::from(*i)),
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract array values if this is an Array variant
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Convert to a serde_json::Value (used for arrays and JSON binding)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I32(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            Value::I64(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            Value::F32(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::F64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter()
                    .map(|byte| serde_json::Value::Number(serde_json::Number::from(*byte)))
                    .collect(),
            ),
            Value::Json(j) => j.clone(),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
        }
    }

    /// Lift a JSON scalar into the matching variant. Objects and arrays of
    /// mixed content stay wrapped as Json.
    pub fn from_json_scalar(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::I64(i),
                None => n.as_f64().map(Value::F64).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }
}

// Implement From for common types
impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::I32(val)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::I64(val)
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::F32(val)
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::F64(val)
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::String(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Bytes(val)
    }
}

impl From<serde_json::Value> for Value {
    fn from(val: serde_json::Value) -> Self {
        Value::Json(val)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(val: uuid::Uuid) -> Self {
        Value::String(val.to_string())
    }
}

#[cfg(feature = "datetime-support")]
impl<Tz> From<chrono::DateTime<Tz>> for Value
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    fn from(val: chrono::DateTime<Tz>) -> Self {
        Value::String(val.to_rfc3339())
    }
}

#[cfg(feature = "datetime-support")]
impl From<chrono::NaiveDateTime> for Value {
    fn from(val: chrono::NaiveDateTime) -> Self {
        Value::String(val.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

#[cfg(feature = "decimal-support")]
impl From<rust_decimal::Decimal> for Value {
    fn from(val: rust_decimal::Decimal) -> Self {
        Value::String(val.to_string())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(vals: Vec<T>) -> Self {
        Value::Array(vals.into_iter().map(|v| v.into()).collect())
    }
}

impl<T> From<&[T]> for Value
where
    T: Clone + Into<Value>,
{
    fn from(vals: &[T]) -> Self {
        Value::Array(vals.iter().cloned().map(|v| v.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_creation() {
        assert_eq!(Value::from(42i32), Value::I32(42));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(Value::from(()), Value::Null);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(Some(42i32)), Value::I32(42));
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_as_bool_only_accepts_bool() {
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::I32(1).as_bool(), None);
        assert_eq!(Value::Null.as_bool(), None);
    }

    #[test]
    fn test_as_i64_widens() {
        assert_eq!(Value::I32(7).as_i64(), Some(7));
        assert_eq!(Value::I64(-3).as_i64(), Some(-3));
        assert_eq!(Value::String("7".into()).as_i64(), None);
    }

    #[test]
    fn test_to_json_arrays() {
        let arr = Value::Array(vec![Value::I32(1), Value::Null, Value::from("x")]);
        assert_eq!(arr.to_json(), serde_json::json!([1, null, "x"]));
    }

    #[test]
    fn test_from_json_scalar() {
        assert_eq!(Value::from_json_scalar(&serde_json::json!(5)), Value::I64(5));
        assert_eq!(Value::from_json_scalar(&serde_json::json!(1.5)), Value::F64(1.5));
        assert_eq!(Value::from_json_scalar(&serde_json::json!("a")), Value::from("a"));
        assert_eq!(Value::from_json_scalar(&serde_json::json!(null)), Value::Null);
        assert_eq!(
            Value::from_json_scalar(&serde_json::json!({"k": 1})),
            Value::Json(serde_json::json!({"k": 1}))
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::I32(42).type_name(), "INTEGER");
        assert_eq!(Value::String("test".to_string()).type_name(), "TEXT");
        assert_eq!(Value::Bool(true).type_name(), "BOOLEAN");
        assert_eq!(Value::Null.type_name(), "NULL");
    }
}
