//! In-memory relational collaborator for dry runs and tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use datamask_core::{
    Catalog, DataStore, Error, IdentityGeneration, QualifiedName, Result, Row, SelectQuery,
    TableDefinition, Value,
};

#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    ddl: Vec<String>,
    selects: Vec<SelectQuery>,
    failing_writes: HashSet<String>,
}

/// A [`DataStore`] keeping tables in process memory.
///
/// Table names are qualified with the store's prefix, so a source and a
/// destination store may share logical names. Every DDL statement is
/// recorded and can be inspected with [`MemoryStore::ddl_log`].
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    schema: Option<String>,
    prefix: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            prefix: String::new(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Create `table` with text columns and the given rows, without logging DDL.
    pub fn seed_table(&self, table: &str, columns: &[&str], primary_key: &[&str], rows: Vec<Row>) -> Result<()> {
        let definition = TableDefinition {
            table: self.qualify(table),
            columns: columns
                .iter()
                .enumerate()
                .map(|(index, name)| {
                    let mut column = datamask_core::ColumnDefinition::new(
                        i16::try_from(index + 1).unwrap_or(i16::MAX),
                        *name,
                        "text",
                    );
                    column.is_nullable = !primary_key.contains(name);
                    column
                })
                .collect(),
            primary_key: primary_key.iter().map(|key| key.to_string()).collect(),
        };
        self.seed_definition(definition, rows)
    }

    /// Register a table from a full definition, without logging DDL.
    pub fn seed_definition(&self, definition: TableDefinition, rows: Vec<Row>) -> Result<()> {
        let mut state = self.lock()?;
        let columns = definition.column_names();
        let rows = rows.iter().map(|row| row.project(&columns)).collect();
        state
            .tables
            .insert(definition.table.name.clone(), MemoryTable { definition, rows });
        Ok(())
    }

    /// Current rows of `table`.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let state = self.lock()?;
        Ok(self.table(&state, table)?.rows.clone())
    }

    /// DDL statements executed through [`DataStore`] methods.
    pub fn ddl_log(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.ddl.clone())
    }

    /// Every query received by `select` and `average`, in order.
    pub fn select_log(&self) -> Result<Vec<SelectQuery>> {
        Ok(self.lock()?.selects.clone())
    }

    /// Make every following write to `table` fail.
    pub fn fail_writes_to(&self, table: &str) -> Result<()> {
        self.lock()?.failing_writes.insert(table.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Other(format!("{} store lock poisoned", self.name)))
    }

    fn physical(&self, table: &str) -> String {
        format!("{}{table}", self.prefix)
    }

    fn table<'s>(&self, state: &'s MemoryState, table: &str) -> Result<&'s MemoryTable> {
        state
            .tables
            .get(&self.physical(table))
            .ok_or_else(|| Error::TableNotFound(self.qualify(table).to_string()))
    }

    fn table_mut<'s>(&self, state: &'s mut MemoryState, table: &str) -> Result<&'s mut MemoryTable> {
        let physical = self.physical(table);
        if state.failing_writes.contains(table) {
            return Err(Error::Db(format!("write to {physical} rejected")));
        }
        let qualified = self.qualify(table).to_string();
        state
            .tables
            .get_mut(&physical)
            .ok_or(Error::TableNotFound(qualified))
    }

    fn windowed_rows(&self, table: &MemoryTable, query: &SelectQuery) -> Result<Vec<Row>> {
        let columns = if query.columns.is_empty() {
            table.definition.column_names()
        } else {
            query.columns.clone()
        };
        let known = table.definition.column_names();
        if let Some(missing) = columns.iter().find(|column| !known.contains(column)) {
            return Err(Error::Db(format!(
                "column \"{missing}\" does not exist in {}",
                table.definition.table
            )));
        }

        let mut rows = table.rows.clone();
        if !query.order_by.is_empty() {
            rows.sort_by(|left, right| compare_rows(left, right, &query.order_by));
        }
        let rows: Vec<Row> = match query.window {
            Some(window) => {
                let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
                let limit = window
                    .limit
                    .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
                    .unwrap_or(usize::MAX);
                rows.into_iter().skip(offset).take(limit).collect()
            }
            None => rows,
        };

        let mut projected: Vec<Row> = rows.iter().map(|row| row.project(&columns)).collect();
        if query.distinct {
            let mut unique: Vec<Row> = Vec::with_capacity(projected.len());
            for row in projected {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            projected = unique;
        }
        Ok(projected)
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) if rank(left) == 2 && rank(right) == 2 => {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            _ => rank(left).cmp(&rank(right)),
        },
    }
}

fn compare_rows(left: &Row, right: &Row, order_by: &[String]) -> Ordering {
    for column in order_by {
        let ordering = compare_values(
            left.get(column).unwrap_or(&Value::Null),
            right.get(column).unwrap_or(&Value::Null),
        );
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Columns that fill themselves when a row omits them.
fn generated_columns(definition: &TableDefinition) -> Vec<String> {
    definition
        .columns
        .iter()
        .filter(|column| {
            matches!(
                column.identity,
                Some(IdentityGeneration::Always | IdentityGeneration::ByDefault)
            ) || column
                .default
                .as_deref()
                .is_some_and(|value| value.starts_with("nextval("))
        })
        .map(|column| column.name.clone())
        .collect()
}

fn prepare_insert(table: &MemoryTable, row: &Row) -> Result<Row> {
    let known = table.definition.column_names();
    if let Some(unknown) = row.columns().find(|column| !known.iter().any(|k| k == column)) {
        return Err(Error::Db(format!(
            "column \"{unknown}\" of relation {} does not exist",
            table.definition.table
        )));
    }
    let mut projected = row.project(&known);
    for column in generated_columns(&table.definition) {
        if !row.contains(&column) {
            let next = table
                .rows
                .iter()
                .filter_map(|existing| existing.get(&column).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            projected.set(&column, Value::Int(next));
        }
    }
    Ok(projected)
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn qualify(&self, table: &str) -> QualifiedName {
        QualifiedName::new(self.schema.as_deref(), self.physical(table))
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.lock()?.tables.contains_key(&self.physical(table)))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(self.table(&state, table)?.definition.column_names())
    }

    async fn table_definition(&self, table: &str) -> Result<TableDefinition> {
        let state = self.lock()?;
        Ok(self.table(&state, table)?.definition.clone())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        let mut state = self.lock()?;
        if state.tables.contains_key(&definition.table.name) {
            return Err(Error::Db(format!(
                "relation {} already exists",
                definition.table
            )));
        }
        state.ddl.push(definition.to_create_sql());
        state.tables.insert(
            definition.table.name.clone(),
            MemoryTable {
                definition: definition.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.lock()?;
        let physical = self.physical(table);
        if state.tables.remove(&physical).is_none() {
            return Err(Error::TableNotFound(self.qualify(table).to_string()));
        }
        state
            .ddl
            .push(format!("DROP TABLE {}", self.qualify(table).to_sql()));
        Ok(())
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        let mut state = self.lock()?;
        self.table_mut(&mut state, table)?.rows.clear();
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let mut state = self.lock()?;
        state.selects.push(query.clone());
        let table = self.table(&state, &query.table)?;
        self.windowed_rows(table, query)
    }

    async fn average(&self, query: &SelectQuery) -> Result<Option<f64>> {
        let mut state = self.lock()?;
        state.selects.push(query.clone());
        let table = self.table(&state, &query.table)?;
        let Some(column) = query.columns.first() else {
            return Err(Error::InvalidConfig("average needs one column".to_string()));
        };
        let numbers: Vec<f64> = self
            .windowed_rows(table, query)?
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_f64))
            .collect();
        if numbers.is_empty() {
            return Ok(None);
        }
        Ok(Some(numbers.iter().sum::<f64>() / numbers.len() as f64))
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.lock()?;
        let target = self.table_mut(&mut state, table)?;
        let mut staged = target.clone();
        for row in rows {
            let row = prepare_insert(&staged, row)?;
            staged.rows.push(row);
        }
        *target = staged;
        Ok(rows.len() as u64)
    }

    async fn upsert(&self, table: &str, key: &[String], rows: &[Row]) -> Result<u64> {
        if key.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "upsert into {table} needs a key"
            )));
        }
        let mut state = self.lock()?;
        let target = self.table_mut(&mut state, table)?;
        // Applied to a copy so a failing row leaves the table untouched.
        let mut staged = target.clone();
        for row in rows {
            let matches = |existing: &Row| {
                key.iter().all(|column| {
                    match (existing.get(column), row.get(column)) {
                        (Some(left), Some(right)) => left.loosely_equals(right),
                        _ => false,
                    }
                })
            };
            match staged.rows.iter().position(matches) {
                Some(index) => {
                    let existing = &mut staged.rows[index];
                    for (column, value) in row.iter() {
                        if !key.iter().any(|k| k == column) {
                            existing.set(column, value.clone());
                        }
                    }
                }
                None => {
                    let row = prepare_insert(&staged, row)?;
                    staged.rows.push(row);
                }
            }
        }
        *target = staged;
        Ok(rows.len() as u64)
    }
}

/// [`Catalog`] over a source and a destination memory store.
///
/// Each name passed to [`Catalog::column_diff`] is resolved against its own
/// store, so both sides may share a schema and a physical table name.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    source: Arc<MemoryStore>,
    destination: Arc<MemoryStore>,
}

impl MemoryCatalog {
    pub fn new(source: Arc<MemoryStore>, destination: Arc<MemoryStore>) -> Self {
        Self {
            source,
            destination,
        }
    }
}

fn catalog_columns(store: &MemoryStore, table: &QualifiedName) -> Result<Vec<String>> {
    if store.schema != table.schema {
        return Ok(Vec::new());
    }
    let state = store.lock()?;
    Ok(state
        .tables
        .get(&table.name)
        .map(|found| found.definition.column_names())
        .unwrap_or_default())
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn column_diff(&self, source: &QualifiedName, destination: &QualifiedName) -> Result<u64> {
        let destination = catalog_columns(&self.destination, destination)?;
        let missing = catalog_columns(&self.source, source)?
            .iter()
            .filter(|column| !destination.contains(column))
            .count();
        Ok(missing as u64)
    }
}

#[cfg(test)]
mod tests {
    use datamask_core::Window;

    use super::*;

    fn row(id: i64, name: &str) -> Row {
        [("id", Value::Int(id)), ("name", Value::from(name))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn windowed_distinct_only_sees_the_window() {
        let store = MemoryStore::new("source");
        store
            .seed_table(
                "users",
                &["id", "name"],
                &["id"],
                vec![row(1, "a"), row(2, "a"), row(3, "b"), row(4, "c")],
            )
            .expect("seed");

        let query = SelectQuery::table("users")
            .columns(["name"])
            .distinct()
            .order_by(&["id".to_string()])
            .window(Some(Window::new(0, Some(3))));
        let rows = store.select(&query).await.expect("select");
        let names: Vec<_> = rows.iter().filter_map(|row| row.get("name")).cloned().collect();
        assert_eq!(names, vec![Value::from("a"), Value::from("b")]);
    }

    #[tokio::test]
    async fn upsert_updates_matches_and_inserts_the_rest() {
        let store = MemoryStore::new("destination").with_prefix("dest_");
        store
            .seed_table("users", &["id", "name"], &["id"], vec![row(1, "old")])
            .expect("seed");

        let written = store
            .upsert("users", &["id".to_string()], &[row(1, "new"), row(2, "two")])
            .await
            .expect("upsert");
        assert_eq!(written, 2);
        let rows = store.rows("users").expect("rows");
        assert_eq!(rows, vec![row(1, "new"), row(2, "two")]);
        assert_eq!(store.qualify("users").name, "dest_users");
    }

    #[tokio::test]
    async fn catalog_counts_missing_destination_columns() {
        let source = Arc::new(MemoryStore::new("source"));
        let destination = Arc::new(MemoryStore::new("destination").with_prefix("dest_"));
        source
            .seed_table("users", &["id", "name", "email"], &["id"], Vec::new())
            .expect("seed");
        destination
            .seed_table("users", &["id", "name"], &["id"], Vec::new())
            .expect("seed");

        let catalog = MemoryCatalog::new(source.clone(), destination.clone());
        let diff = catalog
            .column_diff(&source.qualify("users"), &destination.qualify("users"))
            .await
            .expect("diff");
        assert_eq!(diff, 1);
    }

    #[tokio::test]
    async fn catalog_resolves_shared_names_per_store() {
        let source = Arc::new(MemoryStore::new("source"));
        let destination = Arc::new(MemoryStore::new("destination"));
        source
            .seed_table("people", &["id", "name", "email"], &["id"], Vec::new())
            .expect("seed");
        destination
            .seed_table("people", &["id", "name"], &["id"], Vec::new())
            .expect("seed");
        assert_eq!(source.qualify("people"), destination.qualify("people"));

        let catalog = MemoryCatalog::new(source.clone(), destination.clone());
        let diff = catalog
            .column_diff(&source.qualify("people"), &destination.qualify("people"))
            .await
            .expect("diff");
        assert_eq!(diff, 1);
    }
}
