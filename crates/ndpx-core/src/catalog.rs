//! # Catalog Interface
//!
//! The catalog provides the rewriter with metadata about registered
//! relations: column definitions and table-level statistics. The statistics
//! feed the size estimator so that rewritten fragments carry estimates the
//! host's cost model can trust.
//!
//! The `Catalog` trait is minimal and used behind `dyn Catalog` so different
//! backends can provide metadata. `InMemoryCatalog` is the programmatic
//! implementation used in tests and development.

use crate::expr::AttributeRef;
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn table_stats(&self, table: &TableRef) -> Option<Statistics>;
    fn table_columns(&self, table: &TableRef) -> Option<Vec<AttributeRef>>;
}

/// In-memory catalog for testing and development.
///
/// Tables are keyed by their fully-qualified name (`schema.table`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    table_stats: HashMap<String, Statistics>,
    table_columns: HashMap<String, Vec<AttributeRef>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: Vec<AttributeRef>, stats: Statistics) {
        let key = table.to_string();
        self.table_columns.insert(key.clone(), columns);
        self.table_stats.insert(key, stats);
    }
}

impl Catalog for InMemoryCatalog {
    fn table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.table_stats.get(&table.to_string()).cloned()
    }

    fn table_columns(&self, table: &TableRef) -> Option<Vec<AttributeRef>> {
        self.table_columns.get(&table.to_string()).cloned()
    }
}
