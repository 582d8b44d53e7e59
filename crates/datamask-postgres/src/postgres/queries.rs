use sqlx::PgPool;

use datamask_core::{Error, Result};

fn db(err: sqlx::Error) -> Error {
    Error::Db(err.to_string())
}

pub async fn table_exists(pool: &PgPool, schema: &str, table: &str) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        select exists (
          select 1
          from information_schema.tables
          where table_schema = $1
            and table_name = $2
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(pool)
    .await
    .map_err(db)
}

pub struct RawColumn {
    pub ordinal_position: i16,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub identity_generation: Option<String>,
}

pub async fn list_columns(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
    let rows = sqlx::query_as::<_, (i16, String, String, bool, Option<String>, Option<String>)>(
        r#"
        select
          a.attnum,
          a.attname::text,
          pg_catalog.format_type(a.atttypid, a.atttypmod),
          (not a.attnotnull),
          pg_get_expr(ad.adbin, ad.adrelid),
          case
            when a.attidentity = 'a' then 'ALWAYS'
            when a.attidentity = 'd' then 'BY DEFAULT'
            else null
          end::text
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_attrdef ad on ad.adrelid = a.attrelid and ad.adnum = a.attnum
        where n.nspname = $1
          and c.relname = $2
          and a.attnum > 0
          and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db)?;

    Ok(rows
        .into_iter()
        .map(
            |(ordinal_position, name, data_type, is_nullable, default, identity_generation)| {
                RawColumn {
                    ordinal_position,
                    name,
                    data_type,
                    is_nullable,
                    default,
                    identity_generation,
                }
            },
        )
        .collect())
}

pub async fn get_primary_key(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<String>> {
    let columns = sqlx::query_scalar::<_, Vec<String>>(
        r#"
        select array_agg(att.attname::text order by ord.ordinality)
        from pg_constraint con
        join pg_class rel on rel.oid = con.conrelid
        join pg_namespace nsp on nsp.oid = rel.relnamespace
        join unnest(con.conkey) with ordinality as ord(attnum, ordinality) on true
        join pg_attribute att on att.attrelid = rel.oid and att.attnum = ord.attnum
        where nsp.nspname = $1
          and rel.relname = $2
          and con.contype = 'p'
        group by con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(pool)
    .await
    .map_err(db)?;

    Ok(columns.unwrap_or_default())
}

/// Source columns missing from the destination table.
pub async fn column_diff(
    pool: &PgPool,
    source: (&str, &str),
    destination: (&str, &str),
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        select count(*)
        from information_schema.columns s
        left join information_schema.columns d
          on d.table_schema = $3
         and d.table_name = $4
         and d.column_name = s.column_name
        where s.table_schema = $1
          and s.table_name = $2
          and d.column_name is null
        "#,
    )
    .bind(source.0)
    .bind(source.1)
    .bind(destination.0)
    .bind(destination.1)
    .fetch_one(pool)
    .await
    .map_err(db)
}

pub async fn execute(pool: &PgPool, sql: &str) -> Result<u64> {
    let result = sqlx::query(sql).execute(pool).await.map_err(db)?;
    Ok(result.rows_affected())
}

/// Rows of `sql` as JSON object text, one per row.
pub async fn fetch_json_rows(pool: &PgPool, sql: &str) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(sql)
        .fetch_all(pool)
        .await
        .map_err(db)
}

pub async fn fetch_average(pool: &PgPool, sql: &str) -> Result<Option<f64>> {
    sqlx::query_scalar::<_, Option<f64>>(sql)
        .fetch_one(pool)
        .await
        .map_err(db)
}
