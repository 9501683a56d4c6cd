//! Raw statement results as returned by the engine.

use serde::{Deserialize, Serialize};

/// Name and engine type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Engine type name, for example `TIMESTAMP` or `DECIMAL(10,2)`.
    pub type_name: String,
}

impl ColumnMeta {
    /// Creates column metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A fully fetched result set. Cells are kept as the engine's text rendering;
/// `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSet {
    /// Result columns in select order.
    pub columns: Vec<ColumnMeta>,
    /// Rows, each as wide as `columns`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Creates an empty result set with the given columns.
    #[must_use]
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.rows
            .push(cells.into_iter().map(|c| c.map(Into::into)).collect());
        self
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the non-null values of column `index`, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index).and_then(Option::as_deref))
    }
}
