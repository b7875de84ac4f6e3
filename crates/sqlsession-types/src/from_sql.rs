//! Trait for converting from SQL values to Rust types.
//!
//! Conversions are lenient in the same places common SQL drivers are: text
//! columns holding numbers parse into numeric targets, integers 0/1 read as
//! booleans, and any scalar formats into a `String`.

use bytes::Bytes;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted from SQL values.
pub trait FromSql: Sized {
    /// Convert from a SQL value to this type.
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &SqlValue) -> TypeError {
    TypeError::TypeMismatch {
        expected,
        actual: value.type_name().to_string(),
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::String(s) => match s.trim() {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                _ => Err(mismatch("bool", value)),
            },
            SqlValue::Null => Err(TypeError::UnexpectedNull),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Bool(v) => Ok(i64::from(*v)),
            SqlValue::String(s) => s.trim().parse().map_err(|_| mismatch("i64", value)),
            SqlValue::Null => Err(TypeError::UnexpectedNull),
            _ => Err(mismatch("i64", value)),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        let wide = i64::from_sql(value).map_err(|e| match e {
            TypeError::TypeMismatch { actual, .. } => TypeError::TypeMismatch {
                expected: "i32",
                actual,
            },
            other => other,
        })?;
        i32::try_from(wide).map_err(|_| TypeError::OutOfRange { target_type: "i32" })
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::String(s) => s.trim().parse().map_err(|_| mismatch("f64", value)),
            SqlValue::Null => Err(TypeError::UnexpectedNull),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(s) => Ok(s.clone()),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            SqlValue::Bool(v) => Ok(v.to_string()),
            SqlValue::Binary(b) => String::from_utf8(b.to_vec())
                .map_err(|e| TypeError::InvalidEncoding(e.to_string())),
            SqlValue::Null => Err(TypeError::UnexpectedNull),
        }
    }
}

impl FromSql for Bytes {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(b) => Ok(b.clone()),
            SqlValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            SqlValue::Null => Err(TypeError::UnexpectedNull),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }

    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        Ok(Some(T::from_sql_nullable(value)?))
    }
}
