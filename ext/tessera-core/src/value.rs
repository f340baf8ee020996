//!
//! Engine Value Representation
//!
//! Every value crossing the engine boundary (virtual table arguments and
//! cells, function arguments and results) is carried as a `SqlValue`:
//!
//! - `Null`
//! - `Integer(i64)`
//! - `Float(f64)`
//! - `Text(String)` (invalid UTF-8 from the engine is replaced lossily)
//! - `Blob(Vec<u8>)`
//!
//! Conversion to and from the engine goes through `from_value_ref` and the
//! `ToSql`/`FromSql` impls; nothing inspects types at runtime beyond the
//! engine's own storage class tag.
//!

use std::borrow::Cow;
use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Decode an engine value by its storage class.
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Float(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes used when the value is hashed or added to a Bloom filter.
    /// Numbers hash as their decimal text so `1` and `'1'` collide.
    pub fn key_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(i) => Some(Cow::Owned(i.to_string().into_bytes())),
            SqlValue::Float(f) => Some(Cow::Owned(f.to_string().into_bytes())),
            SqlValue::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
            SqlValue::Blob(b) => Some(Cow::Borrowed(b.as_slice())),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(i) => ValueRef::Integer(*i),
            SqlValue::Float(f) => ValueRef::Real(*f),
            SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
            SqlValue::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl FromSql for SqlValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(SqlValue::from_value_ref(value))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_ref_tags() {
        assert_eq!(SqlValue::from_value_ref(ValueRef::Null), SqlValue::Null);
        assert_eq!(SqlValue::from_value_ref(ValueRef::Integer(7)), SqlValue::Integer(7));
        assert_eq!(SqlValue::from_value_ref(ValueRef::Real(1.5)), SqlValue::Float(1.5));
        assert_eq!(
            SqlValue::from_value_ref(ValueRef::Text(b"abc")),
            SqlValue::Text("abc".to_string())
        );
        assert_eq!(
            SqlValue::from_value_ref(ValueRef::Blob(&[1, 2])),
            SqlValue::Blob(vec![1, 2])
        );
    }

    #[test]
    fn test_invalid_utf8_text_is_lossy() {
        let v = SqlValue::from_value_ref(ValueRef::Text(&[0x66, 0xff, 0x6f]));
        assert_eq!(v, SqlValue::Text("f\u{fffd}o".to_string()));
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(SqlValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(SqlValue::Float(2.9).as_i64(), Some(2));
        assert_eq!(SqlValue::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Blob(vec![1]).as_i64(), None);
        assert_eq!(SqlValue::Null.as_f64(), None);
    }

    #[test]
    fn test_key_bytes() {
        assert!(SqlValue::Null.key_bytes().is_none());
        assert_eq!(SqlValue::Integer(10).key_bytes().unwrap().as_ref(), b"10");
        assert_eq!(SqlValue::Text("ab".into()).key_bytes().unwrap().as_ref(), b"ab");
        assert_eq!(SqlValue::Blob(vec![0, 1]).key_bytes().unwrap().as_ref(), &[0, 1]);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
    }
}
