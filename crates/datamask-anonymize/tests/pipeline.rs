use std::collections::BTreeSet;
use std::sync::Arc;

use datamask_anonymize::prelude::*;
use datamask_anonymize::rules::parse_date;
use datamask_anonymize::{
    AnonymizeError, ConnectionSet, FailurePolicy, FakeKind, Manager, MemoryCatalog, MemoryStore,
    RunStatus, ValueSource, WriteMode,
};
use datamask_core::{
    ColumnDefinition, DataStore, IdentityGeneration, Row, TableDefinition, Value,
};

struct Fixture {
    source: Arc<MemoryStore>,
    destination: Arc<MemoryStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            source: Arc::new(MemoryStore::new("source")),
            destination: Arc::new(MemoryStore::new("destination").with_prefix("dest_")),
        }
    }

    fn manager(&self) -> Manager {
        let catalog = MemoryCatalog::new(self.source.clone(), self.destination.clone());
        Manager::new(ConnectionSet {
            source: self.source.clone(),
            destination: self.destination.clone(),
            catalog: Arc::new(catalog),
        })
        .with_seed(Some(42))
    }

    fn seed_people(&self, count: i64) {
        self.source
            .seed_table("people", PEOPLE_COLUMNS, &["id"], people_rows(1..=count))
            .expect("seed people");
    }

    fn written(&self, table: &str) -> Vec<Row> {
        self.destination.rows(table).expect("destination rows")
    }

    fn read(&self, table: &str) -> Vec<Row> {
        self.source.rows(table).expect("source rows")
    }
}

const PEOPLE_COLUMNS: &[&str] = &["id", "name", "city", "district", "zip", "salary", "born"];

fn people_rows(ids: impl IntoIterator<Item = i64>) -> Vec<Row> {
    ids.into_iter()
        .map(|id| {
            [
                ("id", Value::Int(id)),
                ("name", Value::from(format!("person-{id}"))),
                ("city", Value::from(format!("city-{}", id % 4))),
                ("district", Value::Int(id % 4 * 10)),
                ("zip", Value::from(format!("LV-{}", 1000 + id % 4))),
                ("salary", Value::Int(100)),
                ("born", Value::from("1990-01-01")),
            ]
            .into_iter()
            .collect::<Row>()
        })
        .collect()
}

fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}

fn sorted_text(values: Vec<Value>) -> Vec<String> {
    let mut values: Vec<String> = values.iter().map(Value::to_string).collect();
    values.sort();
    values
}

#[tokio::test]
async fn shuffle_all_preserves_the_column_multiset() {
    let fixture = Fixture::new();
    fixture.seed_people(23);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(5)
                .column("name")
                .shuffle_all();
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    let written = fixture.written("people");
    assert_eq!(written.len(), 23);
    assert_eq!(
        sorted_text(column(&written, "name")),
        sorted_text(column(&fixture.read("people"), "name"))
    );
}

#[tokio::test]
async fn unshuffled_group_passes_rows_through() {
    let fixture = Fixture::new();
    fixture.seed_people(9);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(4)
                .column("city")
                .set_unique_constraints(["district", "zip"], false);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    let source = fixture.read("people");
    let written = fixture.written("people");
    for name in ["id", "city", "district", "zip"] {
        assert_eq!(column(&written, name), column(&source, name), "column {name}");
    }
}

#[tokio::test]
async fn shuffled_group_never_fabricates_tuples() {
    let fixture = Fixture::new();
    fixture.seed_people(30);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("district")
                .number_variance(5.0, None)
                .column("city")
                .set_unique_constraints(["district", "zip"], true);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    let triple = |row: &Row| {
        ["city", "district", "zip"]
            .iter()
            .map(|name| row.get(name).map(Value::to_string).unwrap_or_default())
            .collect::<Vec<_>>()
    };
    let originals: BTreeSet<_> = fixture.read("people").iter().map(triple).collect();
    let written = fixture.written("people");
    assert_eq!(written.len(), 30);
    for row in &written {
        assert!(originals.contains(&triple(row)), "fabricated {:?}", triple(row));
    }
}

#[tokio::test]
async fn truncating_runs_are_idempotent() {
    let fixture = Fixture::new();
    fixture.seed_people(12);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("name")
                .replace_with_fake(datamask_anonymize::FakeKind::FullName);
        })
        .expect("declare");

    let first = manager.run().await;
    let first_ids = column(&fixture.written("people"), "id");
    let second = manager.run().await;
    let second_rows = fixture.written("people");

    assert!(!first.is_failed() && !second.is_failed());
    assert_eq!(second_rows.len(), 12);
    assert_eq!(column(&second_rows, "id"), first_ids);
}

#[tokio::test]
async fn ten_rows_in_chunks_of_four() {
    let fixture = Fixture::new();
    fixture.seed_people(10);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(4)
                .column("name")
                .shuffle_all();
        })
        .expect("declare");

    let report = manager.run().await;
    let table = &report.tables[0];
    assert_eq!(table.chunks, 3);
    assert_eq!(table.rows_read, 10);
    assert_eq!(table.final_offset, 10);
}

#[tokio::test]
async fn offset_and_limit_bound_the_run() {
    let fixture = Fixture::new();
    fixture.seed_people(10);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_offset(2)
                .set_row_count_limit(5)
                .set_chunk_size(2)
                .column("name")
                .shuffle_all();
        })
        .expect("declare");

    let report = manager.run().await;
    let table = &report.tables[0];
    assert_eq!(table.rows_read, 5);
    assert_eq!(table.chunks, 3);
    assert_eq!(table.final_offset, 7);
    let ids = column(&fixture.written("people"), "id");
    assert_eq!(ids, (3..=7).map(Value::Int).collect::<Vec<_>>());
}

#[tokio::test]
async fn number_variance_stays_within_amplitude() {
    let fixture = Fixture::new();
    fixture.seed_people(40);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("salary")
                .number_variance(10.0, None);
        })
        .expect("declare");

    manager.run().await;
    for value in column(&fixture.written("people"), "salary") {
        let salary = value.as_i64().expect("integer salary");
        assert!((90..=110).contains(&salary), "salary {salary}");
    }
}

#[tokio::test]
async fn interval_dates_parse_and_stay_in_range() {
    let fixture = Fixture::new();
    fixture.seed_people(25);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("born")
                .date_time_from_interval("2015-01-01", "2016-03-01", "%Y-%m-%d");
        })
        .expect("declare");

    manager.run().await;
    let from = parse_date("2015-01-01", "%Y-%m-%d").expect("from");
    let to = parse_date("2016-03-01", "%Y-%m-%d").expect("to");
    for value in column(&fixture.written("people"), "born") {
        let born = value
            .as_str()
            .and_then(|text| parse_date(text, "%Y-%m-%d"))
            .expect("parses under declared format");
        assert!(born >= from && born <= to);
    }
}

#[tokio::test]
async fn composite_key_without_truncate_fails_before_writing() {
    let fixture = Fixture::new();
    fixture.seed_people(5);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id", "name"])
                .set_truncate_destination(false)
                .set_insert_mode(true)
                .column("salary")
                .noise(3.0);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Failed);
    assert!(
        report
            .error
            .as_deref()
            .is_some_and(|error| error.contains("composite primary key"))
    );
    assert!(fixture.written("people").is_empty());
}

#[tokio::test]
async fn reconciliation_recreates_drifted_tables_only() {
    let fixture = Fixture::new();
    fixture.seed_people(3);
    fixture
        .destination
        .seed_table("people", &["id", "name"], &["id"], Vec::new())
        .expect("drifted destination");

    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table.column("name").do_nothing();
        })
        .expect("declare")
        .table("missing", |table| {
            table.column("x").nullify(true);
        })
        .expect("declare");

    let report = manager.reconcile_schema().await.expect("reconcile");
    assert_eq!(report.recreated, vec!["people".to_string()]);
    assert_eq!(report.skipped, vec!["missing".to_string()]);
    assert_eq!(manager.table_names(), vec!["people".to_string()]);
    let ddl = fixture.destination.ddl_log().expect("ddl");
    assert_eq!(ddl.len(), 2);
    assert!(ddl[1].starts_with("CREATE TABLE \"dest_people\""));
    assert_eq!(
        fixture.destination.list_columns("people").await.expect("columns"),
        fixture.source.list_columns("people").await.expect("columns")
    );

    let again = manager.reconcile_schema().await.expect("reconcile");
    assert_eq!(again.kept, vec!["people".to_string()]);
    assert_eq!(fixture.destination.ddl_log().expect("ddl").len(), 2);
}

#[tokio::test]
async fn append_mode_drops_the_single_key() {
    let fixture = Fixture::new();
    let mut id = ColumnDefinition::new(1, "id", "integer");
    id.is_nullable = false;
    id.identity = Some(IdentityGeneration::ByDefault);
    let definition = TableDefinition {
        table: fixture.source.qualify("accounts"),
        columns: vec![id, ColumnDefinition::new(2, "name", "text")],
        primary_key: vec!["id".to_string()],
    };
    let rows = (1..=4)
        .map(|id| {
            [("id", Value::Int(id)), ("name", Value::from(format!("owner-{id}")))]
                .into_iter()
                .collect::<Row>()
        })
        .collect();
    fixture.source.seed_definition(definition, rows).expect("seed");

    let mut manager = fixture.manager();
    manager
        .table("accounts", |table| {
            table
                .set_primary_key(["id"])
                .column("name")
                .replace_with("anon");
        })
        .expect("declare");

    let first = manager.run().await;
    assert_eq!(first.tables[0].write_mode, WriteMode::Append);
    manager.run().await;

    let written = fixture.written("accounts");
    assert_eq!(written.len(), 8);
    let ids: BTreeSet<i64> = column(&written, "id")
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    assert_eq!(ids, (1..=8).collect());
}

#[tokio::test]
async fn update_mode_upserts_by_key() {
    let fixture = Fixture::new();
    fixture.seed_people(6);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_insert_mode(false)
                .set_chunk_size(4)
                .column("name")
                .replace_with("anon");
        })
        .expect("declare");

    let first = manager.run().await;
    assert_eq!(first.tables[0].write_mode, WriteMode::Upsert);
    let second = manager.run().await;
    assert!(!second.is_failed(), "{:?}", second.error);

    let written = fixture.written("people");
    assert_eq!(written.len(), 6);
    assert!(column(&written, "name").iter().all(|name| *name == Value::from("anon")));
}

#[tokio::test]
async fn failure_abandons_remaining_tables_and_applies_policy() {
    let fixture = Fixture::new();
    fixture.seed_people(4);
    fixture
        .source
        .seed_table(
            "notes",
            &["id", "body"],
            &["id"],
            vec![[("id", Value::Int(1)), ("body", Value::from("x"))].into_iter().collect()],
        )
        .expect("seed notes");
    fixture
        .source
        .seed_table("audit", &["id"], &["id"], Vec::new())
        .expect("seed audit");

    let mut manager = fixture.manager().with_failure_policy(FailurePolicy::TruncateWritten);
    manager
        .table("people", |table| {
            table.set_primary_key(["id"]).set_truncate_destination(true);
        })
        .expect("declare")
        .table("notes", |table| {
            table
                .set_truncate_destination(true)
                .column("body")
                .date_time_modifier(datamask_anonymize::DateUnit::Day, 3, None, "%Y-%m-%d");
        })
        .expect("declare")
        .table("audit", |table| {
            table.set_truncate_destination(true);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.abandoned, vec!["audit".to_string()]);
    assert!(report.rolled_back.contains(&"people".to_string()));
    assert!(fixture.written("people").is_empty());
    assert!(report.error.as_deref().is_some_and(|error| error.contains("body")));
}

#[tokio::test]
async fn keep_partial_leaves_earlier_tables_written() {
    let fixture = Fixture::new();
    fixture.seed_people(3);
    fixture
        .source
        .seed_table("audit", &["id"], &["id"], vec![[("id", Value::Int(1))].into_iter().collect()])
        .expect("seed audit");
    fixture.destination.fail_writes_to("audit").expect("fail audit");

    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("name")
                .replace_with("anon");
        })
        .expect("declare")
        .table("audit", |table| {
            table.set_primary_key(["id"]);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.abandoned.is_empty());
    assert!(report.rolled_back.is_empty());
    assert_eq!(fixture.written("people").len(), 3);
    assert!(report.error.as_deref().is_some_and(|error| error.contains("rejected")));
}

#[tokio::test]
async fn checker_flags_columns_left_unchanged() {
    let fixture = Fixture::new();
    fixture.seed_people(3);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_check_table(true)
                .column("zip")
                .transform_with("identity", |ctx| Ok(ctx.value.clone()));
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.checks.len(), 1);
    let check = &report.checks[0];
    assert_eq!(check.comparable_columns, vec!["zip".to_string()]);
    assert_eq!(check.duplicate_count, 3);
    assert_eq!(
        check.messages.last().map(String::as_str),
        Some("Total duplicates found - 3")
    );
}

#[tokio::test]
async fn chunked_aggregate_uses_the_chunk_average() {
    let fixture = Fixture::new();
    let rows = (1..=4)
        .map(|id| {
            [("id", Value::Int(id)), ("amount", Value::Int(id * 10))]
                .into_iter()
                .collect::<Row>()
        })
        .collect();
    fixture
        .source
        .seed_table("payments", &["id", "amount"], &["id"], rows)
        .expect("seed");
    let mut manager = fixture.manager();
    manager
        .table("payments", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(2)
                .column("amount")
                .chunked_aggregation();
        })
        .expect("declare");

    manager.run().await;
    let amounts = column(&fixture.written("payments"), "amount");
    assert_eq!(
        amounts,
        vec![Value::Int(15), Value::Int(15), Value::Int(35), Value::Int(35)]
    );
}

#[tokio::test]
async fn declaration_errors_surface_from_table() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager();
    let result = manager.table("people", |table| {
        table.column("flag").replace_yes_no(("Y", "N"), 1.5);
    });
    assert!(matches!(result, Err(AnonymizeError::Config(message)) if message.contains("yes_no")));
}

#[tokio::test]
async fn failed_run_keeps_rows_of_upserted_tables() {
    let fixture = Fixture::new();
    fixture.seed_people(3);
    fixture
        .destination
        .seed_table("people", PEOPLE_COLUMNS, &["id"], people_rows(101..=200))
        .expect("existing destination rows");
    fixture
        .source
        .seed_table("audit", &["id"], &["id"], vec![[("id", Value::Int(1))].into_iter().collect()])
        .expect("seed audit");
    fixture.destination.fail_writes_to("audit").expect("fail audit");

    let mut manager = fixture.manager().with_failure_policy(FailurePolicy::TruncateWritten);
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_insert_mode(false)
                .column("name")
                .replace_with("anon");
        })
        .expect("declare")
        .table("audit", |table| {
            table.set_primary_key(["id"]).set_truncate_destination(true);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.rolled_back.is_empty());
    assert_eq!(report.not_rolled_back, vec!["people".to_string()]);
    let written = fixture.written("people");
    assert_eq!(written.len(), 103);
    let kept = column(&written, "id")
        .iter()
        .filter_map(Value::as_i64)
        .filter(|id| *id > 100)
        .count();
    assert_eq!(kept, 100);
}

#[tokio::test]
async fn reconciliation_compares_each_side_in_its_own_store() {
    let source = Arc::new(MemoryStore::new("source"));
    let destination = Arc::new(MemoryStore::new("destination"));
    source
        .seed_table("people", &["id", "name", "email"], &["id"], Vec::new())
        .expect("seed source");
    destination
        .seed_table("people", &["id", "name"], &["id"], Vec::new())
        .expect("seed destination");

    let mut manager = Manager::new(ConnectionSet {
        source: source.clone(),
        destination: destination.clone(),
        catalog: Arc::new(MemoryCatalog::new(source.clone(), destination.clone())),
    });
    manager
        .table("people", |table| {
            table.column("name").do_nothing();
        })
        .expect("declare");

    let report = manager.reconcile_schema().await.expect("reconcile");
    assert!(report.kept.is_empty());
    assert_eq!(report.recreated, vec!["people".to_string()]);
    assert_eq!(
        destination.list_columns("people").await.expect("columns"),
        vec!["id".to_string(), "name".to_string(), "email".to_string()]
    );
}

#[tokio::test]
async fn reads_without_a_declared_key_use_a_total_order() {
    let fixture = Fixture::new();
    fixture.seed_people(10);
    let tags = (1..=6)
        .map(|n| {
            [("label", Value::from(format!("tag-{}", n % 3))), ("weight", Value::Int(n))]
                .into_iter()
                .collect::<Row>()
        })
        .collect();
    fixture
        .source
        .seed_table("tags", &["label", "weight"], &[], tags)
        .expect("seed tags");

    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_truncate_destination(true)
                .set_chunk_size(4)
                .column("name")
                .shuffle_all();
        })
        .expect("declare")
        .table("tags", |table| {
            table
                .set_truncate_destination(true)
                .set_chunk_size(4)
                .column("label")
                .shuffle_all();
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    let queries = fixture.source.select_log().expect("select log");
    let orders = |table: &str| {
        queries
            .iter()
            .filter(|query| query.table == table)
            .map(|query| query.order_by.clone())
            .collect::<Vec<_>>()
    };
    let people = orders("people");
    assert!(!people.is_empty());
    assert!(people.iter().all(|order| order == &["id".to_string()]));
    let tags = orders("tags");
    assert!(!tags.is_empty());
    assert!(
        tags.iter()
            .all(|order| order == &["label".to_string(), "weight".to_string()])
    );
}

#[tokio::test]
async fn check_without_eligible_columns_is_reported() {
    let fixture = Fixture::new();
    fixture.seed_people(3);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_check_table(true)
                .column("name")
                .do_nothing();
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);
    let check = report.checks.first().expect("check report");
    assert!(check.comparable_columns.is_empty());
    assert!(
        check
            .messages
            .iter()
            .any(|message| message.contains("no comparable columns"))
    );
}

#[tokio::test]
async fn shuffle_unique_samples_the_source_distinct_values() {
    let fixture = Fixture::new();
    fixture.seed_people(20);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(6)
                .column("city")
                .shuffle_unique(false);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    let distinct: BTreeSet<String> = column(&fixture.read("people"), "city")
        .iter()
        .map(Value::to_string)
        .collect();
    let written = fixture.written("people");
    assert_eq!(written.len(), 20);
    for city in column(&written, "city") {
        assert!(distinct.contains(&city.to_string()), "unexpected city {city}");
    }
}

#[tokio::test]
async fn chunked_shuffle_unique_stays_inside_the_window() {
    let fixture = Fixture::new();
    fixture.seed_people(15);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .set_chunk_size(5)
                .column("name")
                .shuffle_unique(true);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);

    for row in fixture.written("people") {
        let id = row.get("id").and_then(Value::as_i64).expect("id");
        let first = (id - 1) / 5 * 5 + 1;
        let window: BTreeSet<String> = (first..first + 5).map(|n| format!("person-{n}")).collect();
        let name = row.get("name").and_then(Value::as_str).expect("name");
        assert!(window.contains(name), "row {id} got {name} from another chunk");
    }
}

#[tokio::test]
async fn one_of_picks_only_listed_values() {
    let fixture = Fixture::new();
    fixture.seed_people(25);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("city")
                .replace_with_one_of(["Riga", "Tallinn", "Vilnius"]);
        })
        .expect("declare");

    manager.run().await;
    let allowed = [
        Value::from("Riga"),
        Value::from("Tallinn"),
        Value::from("Vilnius"),
    ];
    let cities = column(&fixture.written("people"), "city");
    assert_eq!(cities.len(), 25);
    assert!(cities.iter().all(|city| allowed.contains(city)), "{cities:?}");
}

#[tokio::test]
async fn relative_variance_stays_within_percent() {
    let fixture = Fixture::new();
    fixture.seed_people(40);
    let mut manager = fixture.manager();
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("salary")
                .relative_number_variance(0.2, None);
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);
    for value in column(&fixture.written("people"), "salary") {
        let salary = value.as_i64().expect("integer salary");
        assert!((80..=120).contains(&salary), "salary {salary}");
    }
}

struct LabelSource;

impl ValueSource for LabelSource {
    fn generate(&self, kind: FakeKind, _rng: &mut dyn rand::RngCore) -> Value {
        Value::from(format!("generated-{}", kind.as_str()))
    }
}

#[tokio::test]
async fn generators_receive_the_manager_value_source() {
    let fixture = Fixture::new();
    fixture.seed_people(4);
    let mut manager = fixture.manager().with_value_source(Arc::new(LabelSource));
    manager
        .table("people", |table| {
            table
                .set_primary_key(["id"])
                .set_truncate_destination(true)
                .column("name")
                .replace_with_generator(|values, rng| values.generate(FakeKind::City, rng));
        })
        .expect("declare");

    let report = manager.run().await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);
    let expected = Value::from(format!("generated-{}", FakeKind::City.as_str()));
    assert!(
        column(&fixture.written("people"), "name")
            .iter()
            .all(|name| *name == expected)
    );
}
