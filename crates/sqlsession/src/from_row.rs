//! FromRow trait for mapping rows returned by `select` and `get`.
//!
//! Column mapping is up to the caller: implement [`FromRow`] by reading the
//! columns you need from the [`Row`]. Single-column results map directly onto
//! the scalar impls (`i64`, `i32`, `f64`, `bool`, `String` and `Option` of
//! each), which read the first column.

use sqlsession_types::FromSql;

use crate::error::Result;
use crate::row::Row;

/// Trait for types that can be constructed from a database row.
///
/// # Example
///
/// ```rust
/// use sqlsession::{FromRow, Result, Row};
///
/// struct User {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get("id")?,
///             name: row.get("name")?,
///             email: row.get("email")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Construct an instance of this type from a database row.
    ///
    /// # Errors
    ///
    /// Returns an error if a required column is missing or a value cannot be
    /// converted to the expected Rust type.
    fn from_row(row: &Row) -> Result<Self>;
}

macro_rules! impl_scalar_from_row {
    ($($ty:ty),*) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &Row) -> Result<Self> {
                    row.get_index(0)
                }
            }
        )*
    };
}

impl_scalar_from_row!(i64, i32, f64, bool, String);

impl<T: FromSql> FromRow for Option<T> {
    fn from_row(row: &Row) -> Result<Self> {
        row.get_index(0)
    }
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use sqlsession_pool::{ValueArena, ValuePool};
    use sqlsession_types::{SqlValue, ValueKind};

    use super::*;
    use crate::error::Error;
    use crate::row::Column;

    fn single(arena: &mut ValueArena, kind: ValueKind, value: SqlValue) -> Row {
        let slot = arena.acquire_kind(kind).unwrap();
        slot.scan(&value).unwrap();
        Row::new(vec![Column::new("v", kind)].into(), vec![slot])
    }

    #[test]
    fn test_scalar_reads_first_column() {
        let mut arena = ValueArena::new(Arc::new(ValuePool::default()));
        let row = single(&mut arena, ValueKind::Int64, SqlValue::Int(11));
        assert_eq!(i64::from_row(&row).unwrap(), 11);
        assert_eq!(i32::from_row(&row).unwrap(), 11);
        assert_eq!(String::from_row(&row).unwrap(), "11");
    }

    #[test]
    fn test_option_of_null() {
        let mut arena = ValueArena::new(Arc::new(ValuePool::default()));
        let row = single(&mut arena, ValueKind::String, SqlValue::Null);
        assert_eq!(Option::<String>::from_row(&row).unwrap(), None);
        assert!(matches!(String::from_row(&row), Err(Error::Type(_))));
    }

    #[test]
    fn test_row_maps_to_itself() {
        let mut arena = ValueArena::new(Arc::new(ValuePool::default()));
        let row = single(&mut arena, ValueKind::Bool, SqlValue::Bool(true));
        let copy = Row::from_row(&row).unwrap();
        assert!(copy.get::<bool>("v").unwrap());
    }
}
