use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// One row of a [`super::QueryResult`].
///
/// Column names and the name lookup table are shared by every row of a result.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    values: Vec<RowValues>,
}

impl Row {
    /// Build a standalone row; rows inside a result share their column data instead.
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            columns,
            index,
            values,
        }
    }

    pub(crate) fn shared(
        columns: Arc<Vec<String>>,
        index: Arc<HashMap<String, usize>>,
        values: Vec<RowValues>,
    ) -> Self {
        Self {
            columns,
            index,
            values,
        }
    }

    /// Value of `column`; `None` if the result has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.index
            .get(column)
            .copied()
            .or_else(|| self.columns.iter().position(|c| c == column))
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}

/// First occurrence wins for duplicate column names.
pub(crate) fn column_index(columns: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}
