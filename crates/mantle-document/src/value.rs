use std::fmt;

use crate::array::Array;
use crate::document::Document;
use crate::object_id::ObjectId;

/// A single typed value from the closed set a document may hold.
///
/// Equality is type-tagged: `Int32(1)` is not equal to `Int64(1)` or
/// `Double(1.0)`. Use [`crate::compare_values`] for the cross-type ordering
/// that query operators rely on. Within one type the two agree: values of
/// the same numeric width are equal exactly when they compare `Equal`, so
/// NaN equals NaN.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Binary),
    ObjectId(ObjectId),
    DateTime(DateTime),
    Regex(Regex),
    Document(Document),
    Array(Array),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int32(x), Value::Int32(y)) => x == y,
            (Value::Int64(x), Value::Int64(y)) => x == y,
            (Value::Double(x), Value::Double(y)) => x == y || (x.is_nan() && y.is_nan()),
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Binary(x), Value::Binary(y)) => x == y,
            (Value::ObjectId(x), Value::ObjectId(y)) => x == y,
            (Value::DateTime(x), Value::DateTime(y)) => x == y,
            (Value::Regex(x), Value::Regex(y)) => x == y,
            (Value::Document(x), Value::Document(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => x == y,
            _ => false,
        }
    }
}

/// Discriminant of a [`Value`], used in error messages and type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int32,
    Int64,
    Double,
    String,
    Binary,
    ObjectId,
    DateTime,
    Regex,
    Document,
    Array,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int32 => "int",
            ValueKind::Int64 => "long",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Binary => "binData",
            ValueKind::ObjectId => "objectId",
            ValueKind::DateTime => "date",
            ValueKind::Regex => "regex",
            ValueKind::Document => "object",
            ValueKind::Array => "array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
            Value::ObjectId(_) => ValueKind::ObjectId,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Regex(_) => ValueKind::Regex,
            Value::Document(_) => ValueKind::Document,
            Value::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Double(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Integral view of a numeric value. Doubles qualify only when they hold
    /// a whole number within `i64` range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Double(v)
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
            {
                Some(*v as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

/// Opaque bytes tagged with a one-byte subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub const GENERIC: u8 = 0x00;

    pub fn generic(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype: Self::GENERIC,
            bytes: bytes.into(),
        }
    }
}

/// UTC instant with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime(i64);

impl DateTime {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }
}

/// A regular expression literal: pattern plus option letters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: options.into(),
        }
    }
}

// ── Conversions ─────────────────────────────────────────────

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f64 => Double,
    String => String,
    Binary => Binary,
    ObjectId => ObjectId,
    DateTime => DateTime,
    Regex => Regex,
    Document => Document,
    Array => Array,
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_variants_are_not_equal_across_types() {
        assert_ne!(Value::Int32(1), Value::Int64(1));
        assert_ne!(Value::Int32(1), Value::Double(1.0));
        assert_ne!(Value::Int64(1), Value::Double(1.0));
        assert_eq!(Value::Int32(1), Value::Int32(1));
    }

    #[test]
    fn as_i64_accepts_whole_doubles_only() {
        assert_eq!(Value::Double(3.0).as_i64(), Some(3));
        assert_eq!(Value::Double(3.5).as_i64(), None);
        assert_eq!(Value::Int32(-4).as_i64(), Some(-4));
        assert_eq!(Value::from("3").as_i64(), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(7_i64)), Value::Int64(7));
    }
}
