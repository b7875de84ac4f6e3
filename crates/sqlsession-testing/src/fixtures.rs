//! Canned result sets and test setup helpers.

use sqlsession_types::{SqlValue, ValueKind};

use crate::mock_driver::MockRows;

/// Query that [`users`] answers.
pub const USERS_SQL: &str = "SELECT id, name, email, active FROM users";

/// Three users, one with a NULL email.
#[must_use]
pub fn users() -> MockRows {
    MockRows::new([
        ("id", ValueKind::Int64),
        ("name", ValueKind::String),
        ("email", ValueKind::String),
        ("active", ValueKind::Bool),
    ])
    .row([
        SqlValue::Int(1),
        SqlValue::String("ann".into()),
        SqlValue::String("ann@example.com".into()),
        SqlValue::Bool(true),
    ])
    .row([
        SqlValue::Int(2),
        SqlValue::String("bob".into()),
        SqlValue::Null,
        SqlValue::Bool(false),
    ])
    .row([
        SqlValue::Int(3),
        SqlValue::String("cy".into()),
        SqlValue::String("cy@example.com".into()),
        SqlValue::Bool(true),
    ])
}

/// A one-column result set of integers.
#[must_use]
pub fn ints(column: &str, values: &[i64]) -> MockRows {
    values.iter().fold(
        MockRows::new([(column, ValueKind::Int64)]),
        |rows, value| rows.row([SqlValue::Int(*value)]),
    )
}

/// A single value in a single row.
#[must_use]
pub fn scalar(column: &str, kind: ValueKind, value: SqlValue) -> MockRows {
    MockRows::new([(column, kind)]).row([value])
}

/// A result set with the given columns and no rows.
#[must_use]
pub fn empty(columns: &[(&str, ValueKind)]) -> MockRows {
    MockRows::new(columns.iter().copied())
}

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
