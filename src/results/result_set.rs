use std::sync::Arc;

use serde::Serialize;

use super::row::{CustomDbRow, index_columns};
use crate::types::RowValues;

/// Rows returned by a statement, in the order the backend produced them.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// The number of rows collected into `results`
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<std::collections::HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set. Rows added before column names are set are dropped.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(column_names), Some(column_index)) = (&self.column_names, &self.column_index)
        {
            self.results.push(CustomDbRow {
                column_names: Arc::clone(column_names),
                rows: row_values,
                column_index: Arc::clone(column_index),
            });
            self.rows_affected += 1;
        }
    }

    /// First row, if any.
    #[must_use]
    pub fn into_first(self) -> Option<CustomDbRow> {
        self.results.into_iter().next()
    }

    /// Generated key carried by the first row's `id` column, if present and non-null.
    #[must_use]
    pub fn first_generated_id(&self) -> Option<i64> {
        self.results
            .first()
            .and_then(|row| row.get("id"))
            .and_then(RowValues::as_generated_id)
    }
}

/// Outcome of [`crate::Database::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunResult {
    /// Rows inserted, updated or deleted.
    pub changes: usize,
    /// Key the backend generated for an INSERT, when it reported one.
    pub last_insert_id: Option<i64>,
}
