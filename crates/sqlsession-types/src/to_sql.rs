//! Trait for converting Rust types to SQL parameter values.
//!
//! Slices and vectors flatten: `&[1i64, 2, 3]` contributes three parameters,
//! which pairs with placeholder helpers for `IN (...)` lists.

use bytes::Bytes;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted to SQL values.
///
/// `Sync` so that `&[&dyn ToSql]` parameter lists can be held across an
/// await point on a multi-threaded runtime.
pub trait ToSql: Sync {
    /// Convert this value to a SQL value.
    fn to_sql(&self) -> Result<SqlValue, TypeError>;

    /// Get the SQL type name for this value.
    fn sql_type(&self) -> &'static str;

    /// Append this value to a parameter list.
    ///
    /// Scalars push one value; collections push one value per element.
    fn append_params(&self, out: &mut Vec<SqlValue>) -> Result<(), TypeError> {
        out.push(self.to_sql()?);
        Ok(())
    }
}

/// Convert a heterogeneous argument list into driver parameters,
/// flattening any slices.
pub fn to_params(args: &[&dyn ToSql]) -> Result<Vec<SqlValue>, TypeError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        arg.append_params(&mut out)?;
    }
    Ok(out)
}

impl ToSql for bool {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Bool(*self))
    }

    fn sql_type(&self) -> &'static str {
        "BOOLEAN"
    }
}

impl ToSql for i32 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Int(i64::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "BIGINT"
    }
}

impl ToSql for i64 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Int(*self))
    }

    fn sql_type(&self) -> &'static str {
        "BIGINT"
    }
}

impl ToSql for u64 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        i64::try_from(*self)
            .map(SqlValue::Int)
            .map_err(|_| TypeError::OutOfRange { target_type: "BIGINT" })
    }

    fn sql_type(&self) -> &'static str {
        "BIGINT"
    }
}

impl ToSql for f64 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Float(*self))
    }

    fn sql_type(&self) -> &'static str {
        "DOUBLE"
    }
}

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }

    fn sql_type(&self) -> &'static str {
        "TEXT"
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "TEXT"
    }
}

impl ToSql for Bytes {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "BLOB"
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }

    fn sql_type(&self) -> &'static str {
        self.type_name()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            Some(v) => v.sql_type(),
            None => "NULL",
        }
    }
}

impl<T: ToSql> ToSql for [T] {
    /// A list is not a single value; use [`ToSql::append_params`].
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Err(TypeError::UnsupportedConversion {
            from: format!("list of {}", self.len()),
            to: "single parameter",
        })
    }

    fn sql_type(&self) -> &'static str {
        "LIST"
    }

    fn append_params(&self, out: &mut Vec<SqlValue>) -> Result<(), TypeError> {
        out.reserve(self.len());
        for item in self {
            item.append_params(out)?;
        }
        Ok(())
    }
}

impl<T: ToSql> ToSql for Vec<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        self.as_slice().to_sql()
    }

    fn sql_type(&self) -> &'static str {
        "LIST"
    }

    fn append_params(&self, out: &mut Vec<SqlValue>) -> Result<(), TypeError> {
        self.as_slice().append_params(out)
    }
}

impl<T: ToSql, const N: usize> ToSql for [T; N] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        self.as_slice().to_sql()
    }

    fn sql_type(&self) -> &'static str {
        "LIST"
    }

    fn append_params(&self, out: &mut Vec<SqlValue>) -> Result<(), TypeError> {
        self.as_slice().append_params(out)
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (*self).to_sql()
    }

    fn sql_type(&self) -> &'static str {
        (*self).sql_type()
    }

    fn append_params(&self, out: &mut Vec<SqlValue>) -> Result<(), TypeError> {
        (*self).append_params(out)
    }
}
