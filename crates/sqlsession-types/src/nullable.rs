//! Nullable scan targets.
//!
//! A [`Nullable<T>`] pairs a payload with a validity flag. An invalid value
//! always carries `T::default()` as its payload, so a cleared slot reads as
//! "invalid and zero".
//!
//! With serde, an invalid value serializes as `null` and a valid one as its
//! bare payload.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::from_sql::FromSql;
use crate::to_sql::ToSql;
use crate::value::SqlValue;

/// A value that may be SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nullable<T> {
    value: T,
    valid: bool,
}

/// Nullable text.
pub type NullString = Nullable<String>;
/// Nullable 64-bit integer.
pub type NullInt64 = Nullable<i64>;
/// Nullable 64-bit float.
pub type NullFloat64 = Nullable<f64>;
/// Nullable boolean.
pub type NullBool = Nullable<bool>;

impl<T: Default> Nullable<T> {
    /// Create a valid value.
    pub fn new(value: T) -> Self {
        Self { value, valid: true }
    }

    /// Create an invalid (NULL) value.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Whether the value is non-NULL.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The payload if valid.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.valid.then_some(&self.value)
    }

    /// The payload, which is `T::default()` when invalid.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Replace the contents.
    pub fn set(&mut self, value: Option<T>) {
        match value {
            Some(v) => {
                self.value = v;
                self.valid = true;
            }
            None => self.clear(),
        }
    }

    /// Reset to invalid and zero.
    pub fn clear(&mut self) {
        self.value = T::default();
        self.valid = false;
    }

    /// Convert into an `Option`.
    pub fn into_option(self) -> Option<T> {
        self.valid.then_some(self.value)
    }
}

impl<T: FromSql + Default> Nullable<T> {
    /// Fill from a driver value. NULL clears the value.
    ///
    /// On conversion error the previous contents are left untouched.
    pub fn scan(&mut self, value: &SqlValue) -> Result<(), TypeError> {
        let converted = T::from_sql_nullable(value)?;
        self.set(converted);
        Ok(())
    }
}

impl<T: Default> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::new(v),
            None => Self::null(),
        }
    }
}

impl<T: Default> From<Nullable<T>> for Option<T> {
    fn from(value: Nullable<T>) -> Self {
        value.into_option()
    }
}

impl<T: FromSql + Default> FromSql for Nullable<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(T::from_sql_nullable(value)?.into())
    }
}

impl<T: ToSql> ToSql for Nullable<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        if self.valid {
            self.value.to_sql()
        } else {
            Ok(SqlValue::Null)
        }
    }

    fn sql_type(&self) -> &'static str {
        self.value.sql_type()
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.valid {
            serializer.serialize_some(&self.value)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de, T> Deserialize<'de> for Nullable<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}
