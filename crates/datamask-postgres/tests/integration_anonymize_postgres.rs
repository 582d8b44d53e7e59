use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use datamask_anonymize::prelude::*;
use datamask_anonymize::{ConnectionSet, Manager, RunStatus};
use datamask_core::{DataStore, SelectQuery, Value};
use datamask_postgres::PgStore;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const FIXTURE: &[&str] = &[
    "drop schema if exists datamask_it cascade",
    "create schema datamask_it",
    "create table datamask_it.users (
        id integer generated by default as identity primary key,
        email text not null,
        city text,
        zip text,
        salary integer,
        created_at timestamp without time zone
    )",
    "insert into datamask_it.users (email, city, zip, salary, created_at)
     select 'user' || n || '@example.com', 'city-' || (n % 3), 'Z' || (n % 3), 100,
            timestamp '2020-01-01 00:00:00' + n * interval '1 day'
     from generate_series(1, 25) as n",
    "create table datamask_it.anon_users (id integer primary key)",
];

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn reset_fixture(pool: &PgPool) -> Result<()> {
    for statement in FIXTURE {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("executing fixture statement: {statement}"))?;
    }
    Ok(())
}

#[tokio::test]
async fn anonymizes_into_prefixed_destination() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL for integration tests");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;
    reset_fixture(&pool).await?;

    let source = Arc::new(PgStore::new("source", pool.clone()).with_schema("datamask_it"));
    let destination = Arc::new(
        PgStore::new("destination", pool.clone())
            .with_schema("datamask_it")
            .with_prefix("anon_"),
    );
    let mut manager = Manager::new(ConnectionSet {
        source: source.clone(),
        destination: destination.clone(),
        catalog: Arc::new(PgStore::new("catalog", pool)),
    })
    .with_seed(Some(7));
    manager
        .table("users", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(10)
                .set_check_table(true)
                .column("email")
                .replace_with_fake(datamask_anonymize::FakeKind::SafeEmail)
                .column("city")
                .set_unique_constraints(["zip"], true)
                .column("salary")
                .number_variance(10.0, None)
                .column("created_at")
                .date_time_modifier(
                    datamask_anonymize::DateUnit::Day,
                    30,
                    None,
                    "%Y-%m-%d %H:%M:%S",
                );
        })
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);
    let reconcile = report.reconcile.as_ref().context("reconcile report")?;
    assert_eq!(reconcile.recreated, vec!["users".to_string()]);
    assert_eq!(report.tables[0].chunks, 3);
    assert_eq!(report.tables[0].rows_written, 25);

    assert_eq!(
        destination.list_columns("users").await?,
        source.list_columns("users").await?
    );
    let rows = destination
        .select(&SelectQuery::table("users").order_by(&["id".to_string()]))
        .await?;
    assert_eq!(rows.len(), 25);
    for row in &rows {
        let salary = row.get("salary").and_then(Value::as_i64).context("salary")?;
        assert!((90..=110).contains(&salary));
        let city = row.get("city").and_then(Value::as_str).context("city")?;
        let zip = row.get("zip").and_then(Value::as_str).context("zip")?;
        assert_eq!(city.trim_start_matches("city-"), zip.trim_start_matches('Z'));
    }

    let check = report.checks.first().context("check report")?;
    assert!(check.comparable_columns.contains(&"email".to_string()));
    Ok(())
}
