//! Helpers for building parameterized statements.

use sqlsession_types::SqlValue;

use crate::row::Row;

/// `n` comma-separated `?` placeholders, e.g. for an `IN (...)` list.
///
/// ```rust
/// use sqlsession::util::placeholders;
///
/// let sql = format!("SELECT name FROM users WHERE id IN ({})", placeholders(3));
/// assert_eq!(sql, "SELECT name FROM users WHERE id IN (?,?,?)");
/// ```
#[must_use]
pub fn placeholders(n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let mut out = String::with_capacity(2 * n - 1);
    out.push('?');
    for _ in 1..n {
        out.push_str(",?");
    }
    out
}

/// One parameter per integer.
#[must_use]
pub fn ints_to_params(ids: &[i64]) -> Vec<SqlValue> {
    ids.iter().copied().map(SqlValue::Int).collect()
}

/// The integer column `key` of every row, 0 where it is missing or NULL.
///
/// ```rust,ignore
/// let rows: Vec<Row> = session.select(&ctx, "SELECT id FROM users", &[]).await?;
/// let ids = collect_ints(&rows, "id");
/// ```
#[must_use]
pub fn collect_ints(rows: &[Row], key: &str) -> Vec<i64> {
    rows.iter().map(|row| row.int_or(key, 0)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use sqlsession_pool::{ValueArena, ValuePool};
    use sqlsession_types::ValueKind;

    use super::*;
    use crate::row::Column;

    fn id_row(arena: &mut ValueArena, id: SqlValue) -> Row {
        let columns: Arc<[Column]> = vec![Column::new("id", ValueKind::Int64)].into();
        let slot = arena.acquire_kind(ValueKind::Int64).unwrap();
        slot.scan(&id).unwrap();
        Row::new(columns, vec![slot])
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(4), "?,?,?,?");
    }

    #[test]
    fn test_ints_to_params() {
        assert_eq!(
            ints_to_params(&[3, 1]),
            vec![SqlValue::Int(3), SqlValue::Int(1)]
        );
        assert!(ints_to_params(&[]).is_empty());
    }

    #[test]
    fn test_collect_ints() {
        let mut arena = ValueArena::new(Arc::new(ValuePool::default()));
        let rows = vec![
            id_row(&mut arena, SqlValue::Int(4)),
            id_row(&mut arena, SqlValue::Null),
            id_row(&mut arena, SqlValue::Int(9)),
        ];
        assert_eq!(collect_ints(&rows, "id"), vec![4, 0, 9]);
        assert_eq!(collect_ints(&rows, "missing"), vec![0, 0, 0]);
        assert!(collect_ints(&[], "id").is_empty());
    }
}
