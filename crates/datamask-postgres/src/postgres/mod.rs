use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use datamask_core::{
    Catalog, ConnectionConfig, ConnectionRole, DataStore, Error, QualifiedName, Result, Row,
    SelectQuery, TableDefinition,
};

mod mapper;
mod queries;

const DEFAULT_SCHEMA: &str = "public";

/// Open a pool for one configured connection.
pub async fn connect_pool(role: ConnectionRole, config: &ConnectionConfig) -> Result<PgPool> {
    let url = config.connection_url(role)?;
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await
        .map_err(|err| Error::Db(format!("connecting {role}: {err}")))
}

/// A Postgres connection acting as source, destination or catalog.
///
/// Logical table names get the connection's schema and prefix applied.
#[derive(Debug, Clone)]
pub struct PgStore {
    name: String,
    pool: PgPool,
    schema: String,
    prefix: String,
}

impl PgStore {
    pub fn new(name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            pool,
            schema: DEFAULT_SCHEMA.to_string(),
            prefix: String::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Connect using a role's configuration, taking its schema and prefix.
    pub async fn connect(role: ConnectionRole, config: &ConnectionConfig) -> Result<Self> {
        let pool = connect_pool(role, config).await?;
        Ok(Self::new(role.as_str(), pool)
            .with_schema(config.schema.clone())
            .with_prefix(config.prefix.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn existing_definition(&self, table: &str) -> Result<TableDefinition> {
        let qualified = self.qualify(table);
        let raw = queries::list_columns(&self.pool, &self.schema, &qualified.name).await?;
        if raw.is_empty() {
            return Err(Error::TableNotFound(qualified.to_string()));
        }
        let primary_key =
            queries::get_primary_key(&self.pool, &self.schema, &qualified.name).await?;
        Ok(mapper::map_definition(qualified, raw, primary_key))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!(store = %self.name, sql, "executing ddl");
        queries::execute(&self.pool, sql).await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for PgStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn qualify(&self, table: &str) -> QualifiedName {
        QualifiedName::new(Some(&self.schema), format!("{}{table}", self.prefix))
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        queries::table_exists(&self.pool, &self.schema, &self.qualify(table).name).await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.existing_definition(table).await?.column_names())
    }

    async fn table_definition(&self, table: &str) -> Result<TableDefinition> {
        self.existing_definition(table).await
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        self.execute_ddl(&definition.to_create_sql()).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute_ddl(&format!("DROP TABLE {}", self.qualify(table).to_sql()))
            .await
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        self.execute_ddl(&format!("TRUNCATE TABLE {}", self.qualify(table).to_sql()))
            .await
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let definition = self.existing_definition(&query.table).await?;
        let columns = mapper::selected_columns(&definition, query)?;
        let sql = mapper::select_sql(&definition, &columns, query);
        queries::fetch_json_rows(&self.pool, &sql)
            .await?
            .iter()
            .map(|text| mapper::map_row(text, &columns))
            .collect()
    }

    async fn average(&self, query: &SelectQuery) -> Result<Option<f64>> {
        let definition = self.existing_definition(&query.table).await?;
        let column = match mapper::selected_columns(&definition, query)?.as_slice() {
            [column] => column.name.clone(),
            _ => {
                return Err(Error::InvalidConfig(
                    "average needs exactly one column".to_string(),
                ));
            }
        };
        let sql = mapper::average_sql(&definition, &column, query);
        queries::fetch_average(&self.pool, &sql).await
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = mapper::batch_columns(rows);
        let sql = mapper::insert_sql(&self.qualify(table), &columns);
        let result = sqlx::query(&sql)
            .bind(mapper::rows_to_json(rows))
            .execute(&self.pool)
            .await
            .map_err(|err| Error::Db(err.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn upsert(&self, table: &str, key: &[String], rows: &[Row]) -> Result<u64> {
        if key.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "upsert into {table} needs a key"
            )));
        }
        let qualified = self.qualify(table);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::Db(err.to_string()))?;
        let mut written = 0;
        for row in rows {
            let columns: Vec<String> = row.columns().map(str::to_string).collect();
            let payload = row.to_json_object().to_string();
            let updated = sqlx::query(&mapper::update_sql(&qualified, key, &columns))
                .bind(&payload)
                .execute(&mut *tx)
                .await
                .map_err(|err| Error::Db(err.to_string()))?
                .rows_affected();
            if updated == 0 {
                sqlx::query(&mapper::insert_one_sql(&qualified, &columns))
                    .bind(&payload)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| Error::Db(err.to_string()))?;
            }
            written += 1;
        }
        tx.commit()
            .await
            .map_err(|err| Error::Db(err.to_string()))?;
        Ok(written)
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn column_diff(&self, source: &QualifiedName, destination: &QualifiedName) -> Result<u64> {
        let source_schema = source.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let destination_schema = destination.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let missing = queries::column_diff(
            &self.pool,
            (source_schema, &source.name),
            (destination_schema, &destination.name),
        )
        .await?;
        Ok(u64::try_from(missing).unwrap_or_default())
    }
}
