//! Row and column types.
//!
//! A [`Row`] is a column-keyed view over the pooled slots filled for one
//! fetched row. The slots belong to the session tree's arena, so a row reads
//! as all-NULL once its root session has been closed.

use std::sync::Arc;

use sqlsession_pool::PooledValue;
use sqlsession_types::{FromSql, SqlValue, ValueKind};

use crate::error::{Error, Result};

/// Column metadata reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    kind: ValueKind,
    nullable: bool,
}

impl Column {
    /// A nullable column.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    /// Set whether the column allows NULL.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot kind values of this column scan into.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Whether the column allows NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// One fetched row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<PooledValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<PooledValue>) -> Self {
        Self { columns, values }
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The pooled slot behind a column.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&PooledValue> {
        self.index_of(name).and_then(|idx| self.values.get(idx))
    }

    /// The pooled slots, in column order.
    #[must_use]
    pub fn values(&self) -> &[PooledValue] {
        &self.values
    }

    /// Read a column by name.
    pub fn get<T: FromSql>(&self, name: &str) -> Result<T> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        self.get_index(idx)
    }

    /// Read a column by position.
    pub fn get_index<T: FromSql>(&self, idx: usize) -> Result<T> {
        let slot = self
            .values
            .get(idx)
            .ok_or_else(|| Error::ColumnNotFound(idx.to_string()))?;
        Ok(T::from_sql(&slot.to_sql_value())?)
    }

    /// Snapshot a column as a driver-neutral value.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<SqlValue> {
        self.value(name).map(PooledValue::to_sql_value)
    }

    /// Text value, or `default` when missing, NULL or not convertible.
    #[must_use]
    pub fn string_or(&self, name: &str, default: &str) -> String {
        self.lenient::<String>(name)
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, or `default` when missing, NULL or not convertible.
    #[must_use]
    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.lenient(name).unwrap_or(default)
    }

    /// Float value, or `default` when missing, NULL or not convertible.
    #[must_use]
    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        self.lenient(name).unwrap_or(default)
    }

    /// Boolean value, or `default` when missing, NULL or not convertible.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.lenient(name).unwrap_or(default)
    }

    fn lenient<T: FromSql>(&self, name: &str) -> Option<T> {
        self.get::<Option<T>>(name).ok().flatten()
    }
}
