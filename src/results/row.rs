use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::types::RowValues;

/// A row from a database query result
///
/// Column names and the name-to-index map are shared by every row of one result set.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    pub(crate) column_index: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a standalone row, building its own column index.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            rows,
            column_index,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Render the row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> Map<String, JsonValue> {
        self.column_names
            .iter()
            .zip(&self.rows)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// First occurrence wins when a query returns duplicate column names.
pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}
