//! Scalar values and condition operands.
//!
//! [`Value`] is what the builder inlines into SQL (through
//! [`Connection::quote`](crate::Connection::quote)) and what result rows carry back.
//! [`Operand`] is the right-hand side of a condition.

use serde::Serialize;
use std::fmt;

/// A SQL scalar value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Numeric values are inlined without quoting.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a JSON value (used for object-shaped rows).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }

    /// Short type name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Json(_) => "json",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Text(v.to_string()),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Text(n.to_string()), Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Value::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl From<chrono::NaiveTime> for Value {
    fn from(v: chrono::NaiveTime) -> Self {
        Value::Text(v.format("%H:%M:%S%.f").to_string())
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for Value
where
    Tz::Offset: fmt::Display,
{
    fn from(v: chrono::DateTime<Tz>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, got {}", value.kind())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("cannot parse '{s}' as integer: {e}")),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{wide} out of range for i32"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("cannot parse '{s}' as unsigned integer: {e}")),
            other => {
                let wide = i64::from_value(other)?;
                u64::try_from(wide).map_err(|_| format!("{wide} is negative"))
            }
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("cannot parse '{s}' as float: {e}")),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Text(s) => match s.as_str() {
                "t" | "true" | "TRUE" | "1" => Ok(true),
                "f" | "false" | "FALSE" | "0" => Ok(false),
                _ => Err(format!("cannot parse '{s}' as bool")),
            },
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Err(mismatch("text", value)),
            Value::Text(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => serde_json::from_str(s).or_else(|_| Ok(value.to_json())),
            other => Ok(other.to_json()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The field is itself a complete boolean expression (`IS NULL`, `BETWEEN`).
    Expression,
    /// A single value compared with the field's operator.
    Scalar(Value),
    /// A list rendered as `(v1,v2,...)` for `IN` / `NOT IN`.
    List(Vec<Value>),
    /// Compiled SELECT for `IN` / `NOT IN`, embedded as written.
    Subquery(String),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Scalar(v)
    }
}

impl From<Vec<Value>> for Operand {
    fn from(v: Vec<Value>) -> Self {
        Operand::List(v)
    }
}

/// Conversion into an [`Operand`].
///
/// Scalars become [`Operand::Scalar`]; vectors, slices and arrays become
/// [`Operand::List`].
pub trait IntoOperand {
    fn into_operand(self) -> Operand;
}

macro_rules! scalar_operand {
    ($($t:ty),*) => {
        $(impl IntoOperand for $t {
            fn into_operand(self) -> Operand {
                Operand::Scalar(Value::from(self))
            }
        })*
    };
}

scalar_operand!(
    i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool, &str, String, &String,
    serde_json::Value, uuid::Uuid, chrono::NaiveDate, chrono::NaiveTime, chrono::NaiveDateTime
);

impl<Tz: chrono::TimeZone> IntoOperand for chrono::DateTime<Tz>
where
    Tz::Offset: fmt::Display,
{
    fn into_operand(self) -> Operand {
        Operand::Scalar(Value::from(self))
    }
}

impl IntoOperand for Value {
    fn into_operand(self) -> Operand {
        Operand::Scalar(self)
    }
}

impl IntoOperand for &Value {
    fn into_operand(self) -> Operand {
        Operand::Scalar(self.clone())
    }
}

impl IntoOperand for Operand {
    fn into_operand(self) -> Operand {
        self
    }
}

impl<T: Into<Value>> IntoOperand for Option<T> {
    fn into_operand(self) -> Operand {
        Operand::Scalar(Value::from(self))
    }
}

impl<T: Into<Value>> IntoOperand for Vec<T> {
    fn into_operand(self) -> Operand {
        Operand::List(self.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> IntoOperand for &[T] {
    fn into_operand(self) -> Operand {
        Operand::List(self.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> IntoOperand for [T; N] {
    fn into_operand(self) -> Operand {
        Operand::List(self.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_detection() {
        assert!(Value::from(3).is_numeric());
        assert!(Value::from(2.5).is_numeric());
        assert!(!Value::from("3").is_numeric());
        assert!(!Value::Null.is_numeric());
    }

    #[test]
    fn large_u64_falls_back_to_text() {
        assert_eq!(Value::from(u64::MAX), Value::Text(u64::MAX.to_string()));
        assert_eq!(Value::from(7u64), Value::Int(7));
    }

    #[test]
    fn json_numbers_keep_their_kind() {
        assert_eq!(Value::from(serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(serde_json::json!("x")), Value::Text("x".into()));
        assert!(matches!(Value::from(serde_json::json!([1])), Value::Json(_)));
    }

    #[test]
    fn text_parses_into_numbers() {
        assert_eq!(i64::from_value(&Value::Text("42".into())), Ok(42));
        assert_eq!(u64::from_value(&Value::Text(" 9 ".into())), Ok(9));
        assert_eq!(f64::from_value(&Value::Text("2.5".into())), Ok(2.5));
        assert!(i64::from_value(&Value::Text("abc".into())).is_err());
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(1)), Ok(Some(1)));
    }

    #[test]
    fn bool_from_postgres_text() {
        assert_eq!(bool::from_value(&Value::Text("t".into())), Ok(true));
        assert_eq!(bool::from_value(&Value::Text("f".into())), Ok(false));
    }

    #[test]
    fn operands_from_collections() {
        assert_eq!(
            vec![1i64, 2].into_operand(),
            Operand::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(["a"].into_operand(), Operand::List(vec![Value::from("a")]));
        assert_eq!(5i32.into_operand(), Operand::Scalar(Value::Int(5)));
        assert_eq!(None::<i32>.into_operand(), Operand::Scalar(Value::Null));
    }

    #[test]
    fn dates_render_as_text() {
        let d = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Value::from(d), Value::Text("2024-02-29".into()));
    }
}
