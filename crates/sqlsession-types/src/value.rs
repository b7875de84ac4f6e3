//! Driver-neutral SQL value representation.

use bytes::Bytes;

/// A column or parameter value as exchanged with a driver.
///
/// Drivers fill a row buffer of `SqlValue`s; the session layer scans those
/// into pooled nullable slots.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value, widened to 64 bits.
    Int(i64),
    /// Floating point value, widened to 64 bits.
    Float(f64),
    /// Text value.
    String(String),
    /// Binary value.
    Binary(Bytes),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::Int(_) => "BIGINT",
            Self::Float(_) => "DOUBLE",
            Self::String(_) => "TEXT",
            Self::Binary(_) => "BLOB",
        }
    }

    /// The pooled slot kind this value scans into, if any.
    ///
    /// `Null` and `Binary` have no natural slot kind.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int64),
            Self::Float(_) => Some(ValueKind::Float64),
            Self::String(_) => Some(ValueKind::String),
            Self::Null | Self::Binary(_) => None,
        }
    }

    /// Try to get as bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i64.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for SqlValue {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Bytes> for SqlValue {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// The four scan-target kinds the value pool recycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Nullable text.
    String,
    /// Nullable 64-bit integer.
    Int64,
    /// Nullable 64-bit float.
    Float64,
    /// Nullable boolean.
    Bool,
}

impl ValueKind {
    /// All kinds, in free-list order.
    pub const ALL: [ValueKind; 4] = [
        ValueKind::String,
        ValueKind::Int64,
        ValueKind::Float64,
        ValueKind::Bool,
    ];

    /// Short name used in logs and stats.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_null_has_no_kind() {
        assert!(SqlValue::Null.is_null());
        assert_eq!(SqlValue::Null.kind(), None);
        assert_eq!(SqlValue::Binary(Bytes::from_static(b"x")).kind(), None);
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(SqlValue::from(1i64).kind(), Some(ValueKind::Int64));
        assert_eq!(SqlValue::from(1.5f64).kind(), Some(ValueKind::Float64));
        assert_eq!(SqlValue::from("a").kind(), Some(ValueKind::String));
        assert_eq!(SqlValue::from(true).kind(), Some(ValueKind::Bool));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7i32)), SqlValue::Int(7));
    }

    #[test]
    fn test_int_widens_to_float() {
        assert_eq!(SqlValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(SqlValue::String("3".into()).as_f64(), None);
    }
}
