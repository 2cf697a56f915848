use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{Row, column_index};
use crate::types::RowValues;

/// Column metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    /// Backend type name, e.g. `int4` or `VARCHAR`.
    pub type_name: String,
}

impl FieldInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Buffered outcome of one statement.
///
/// `row_count` is the number of rows returned for queries and the number of rows
/// affected for DML. `fields` is `None` when the backend does not report metadata
/// (e.g. for statements without a result set).
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub fields: Option<Vec<FieldInfo>>,
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl QueryResult {
    /// Result of a statement that returned no rows.
    #[must_use]
    pub fn affected(row_count: u64) -> Self {
        Self {
            row_count,
            ..Self::default()
        }
    }

    /// Empty result with column metadata; fill with [`QueryResult::push_row`].
    #[must_use]
    pub fn with_fields(fields: Vec<FieldInfo>, capacity: usize) -> Self {
        let columns: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let index = Arc::new(column_index(&columns));
        Self {
            rows: Vec::with_capacity(capacity),
            row_count: 0,
            fields: Some(fields),
            columns: Arc::new(columns),
            index,
        }
    }

    /// Append a row and bump `row_count`.
    pub fn push_row(&mut self, values: Vec<RowValues>) {
        self.rows.push(Row::shared(
            Arc::clone(&self.columns),
            Arc::clone(&self.index),
            values,
        ));
        self.row_count += 1;
    }

    /// Override `row_count`, for backends that report a separate affected count.
    #[must_use]
    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = row_count;
        self
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
