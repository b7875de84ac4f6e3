//! Tracing instrumentation for session operations.
//!
//! Every query, exec, begin, commit and rollback runs inside a `tracing`
//! span. Span fields follow the OpenTelemetry database conventions so an
//! OTLP subscriber can export them unchanged:
//!
//! - `db.operation`: statement kind (SELECT, INSERT, ...)
//! - `db.statement`: SQL text, sanitized if configured
//!
//! With no subscriber installed the spans cost next to nothing.

use tracing::Span;

/// Span names for session operations.
pub mod span_names {
    /// Span name for queries.
    pub const QUERY: &str = "sqlsession.query";
    /// Span name for execs.
    pub const EXEC: &str = "sqlsession.exec";
    /// Span name for opening a transaction.
    pub const BEGIN: &str = "sqlsession.begin";
    /// Span name for committing a transaction.
    pub const COMMIT: &str = "sqlsession.commit";
    /// Span name for rolling back a transaction.
    pub const ROLLBACK: &str = "sqlsession.rollback";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record, in characters.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Set the maximum recorded length.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        let sanitized = sanitize_sql(sql, &self.placeholder);
        truncate_string(&sanitized, self.max_length)
    }
}

/// Replace string and numeric literals with `placeholder`.
///
/// Only `'` opens a literal; `"users"` is a quoted identifier and stays.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(c) = chars.next() {
        if in_literal {
            if c == '\'' {
                // Doubled quote inside a literal.
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                in_literal = false;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' {
            in_literal = true;
            continue;
        }

        if c == '"' {
            result.push(c);
            for ch in chars.by_ref() {
                result.push(ch);
                if ch == '"' {
                    break;
                }
            }
            continue;
        }

        if c.is_ascii_digit() && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_') {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    if in_literal {
        result.push_str(placeholder);
    }

    result
}

/// Truncate to at most `max_chars` characters, marking the cut with `...`.
fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    const OPERATIONS: [(&str, &str); 14] = [
        ("SELECT", "SELECT"),
        ("WITH", "SELECT"),
        ("INSERT", "INSERT"),
        ("UPDATE", "UPDATE"),
        ("DELETE", "DELETE"),
        ("REPLACE", "REPLACE"),
        ("EXEC", "EXECUTE"),
        ("CALL", "EXECUTE"),
        ("BEGIN", "BEGIN"),
        ("COMMIT", "COMMIT"),
        ("ROLLBACK", "ROLLBACK"),
        ("CREATE", "CREATE"),
        ("ALTER", "ALTER"),
        ("DROP", "DROP"),
    ];

    let head = sql
        .trim_start()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();

    OPERATIONS
        .iter()
        .find(|(prefix, _)| head.starts_with(prefix))
        .map_or("OTHER", |(_, op)| *op)
}

pub(crate) fn query_span(sql: &str, config: &SanitizationConfig) -> Span {
    tracing::debug_span!(
        span_names::QUERY,
        db.operation = extract_operation(sql),
        db.statement = %config.sanitize(sql),
    )
}

pub(crate) fn exec_span(sql: &str, config: &SanitizationConfig) -> Span {
    tracing::debug_span!(
        span_names::EXEC,
        db.operation = extract_operation(sql),
        db.statement = %config.sanitize(sql),
        db.rows_affected = tracing::field::Empty,
    )
}

pub(crate) fn begin_span() -> Span {
    tracing::debug_span!(span_names::BEGIN, db.operation = "BEGIN")
}

pub(crate) fn commit_span() -> Span {
    tracing::debug_span!(span_names::COMMIT, db.operation = "COMMIT")
}

pub(crate) fn rollback_span() -> Span {
    tracing::debug_span!(span_names::ROLLBACK, db.operation = "ROLLBACK")
}
