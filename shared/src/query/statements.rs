//! Client-side multi-statement splitting.
//!
//! A dashboard query may carry setup statements (`SET`, `USE`, temporary views)
//! ahead of the statement that returns rows. The body is split on `;` and only
//! the final statement is treated as the row-returning query. Splitting is
//! textual, so a `;` inside a string literal also splits.

/// Statement separator.
pub const SEPARATOR: char = ';';

/// A SQL body split into setup statements and the final query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements<'a> {
    /// Statements executed for their side effects, in order.
    pub setup: Vec<&'a str>,
    /// The statement whose rows are returned.
    pub query: &'a str,
}

/// Splits `sql` on [`SEPARATOR`].
///
/// Fragments are trimmed and whitespace-only fragments (such as the one left by
/// a trailing `;`) are dropped. Returns `None` when nothing executable remains.
///
/// # Example
///
/// ```
/// use shared::query::split_statements;
///
/// let statements = split_statements("SET a=1; SET b=2; SELECT 1;").unwrap();
/// assert_eq!(statements.setup, vec!["SET a=1", "SET b=2"]);
/// assert_eq!(statements.query, "SELECT 1");
/// ```
#[must_use]
pub fn split_statements(sql: &str) -> Option<Statements<'_>> {
    let mut fragments: Vec<&str> = sql
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect();

    let query = fragments.pop()?;
    Some(Statements {
        setup: fragments,
        query,
    })
}
