//! Relational collaborator contracts.
//!
//! - [`DataStore`]: one named connection (source or destination) able to read
//!   windowed rows, write batches, and manage table DDL.
//! - [`Catalog`]: catalog metadata used to compare source and destination tables.
//!
//! Table arguments are logical names; each store applies its own schema and
//! table-name prefix through [`DataStore::qualify`].

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{QualifiedName, TableDefinition};
use crate::value::Row;

/// Offset/limit page of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    /// `None` reads to the end of the table.
    pub limit: Option<u64>,
}

impl Window {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }
}

/// Read request against a single table.
///
/// `distinct` applies to the rows selected by `window`, so a windowed
/// distinct read never sees rows outside the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    /// Empty selects every column in table order.
    pub columns: Vec<String>,
    pub distinct: bool,
    pub order_by: Vec<String>,
    pub window: Option<Window>,
}

impl SelectQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            distinct: false,
            order_by: Vec::new(),
            window: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn order_by(mut self, columns: &[String]) -> Self {
        self.order_by = columns.to_vec();
        self
    }

    pub fn window(mut self, window: Option<Window>) -> Self {
        self.window = window;
        self
    }
}

/// A named relational connection.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Connection label used in logs (e.g. `source`).
    fn name(&self) -> &str;

    /// Apply this connection's schema and table prefix to a logical table name.
    fn qualify(&self, table: &str) -> QualifiedName;

    async fn has_table(&self, table: &str) -> Result<bool>;

    /// Column names in table order.
    async fn list_columns(&self, table: &str) -> Result<Vec<String>>;

    /// The table's DDL as a structured definition.
    async fn table_definition(&self, table: &str) -> Result<TableDefinition>;

    /// Create a table exactly as named by `definition.table`.
    async fn create_table(&self, definition: &TableDefinition) -> Result<()>;

    async fn drop_table(&self, table: &str) -> Result<()>;

    async fn truncate(&self, table: &str) -> Result<()>;

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// `AVG` of the single selected column over the windowed rows.
    async fn average(&self, query: &SelectQuery) -> Result<Option<f64>>;

    /// Bulk insert; returns the number of rows written.
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Update-or-insert every row matched on `key`, in one transaction.
    async fn upsert(&self, table: &str, key: &[String], rows: &[Row]) -> Result<u64>;
}

/// Catalog metadata shared by the source and destination connections.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Number of `source` columns without a same-named `destination` column.
    async fn column_diff(&self, source: &QualifiedName, destination: &QualifiedName)
    -> Result<u64>;
}
