use datamask_core::{
    ColumnDefinition, Error, IdentityGeneration, QualifiedName, Result, Row, SelectQuery,
    TableDefinition, Value, quote_ident,
};

use super::queries::RawColumn;

pub fn identity_from_text(value: Option<&str>) -> Option<IdentityGeneration> {
    match value {
        Some("ALWAYS") => Some(IdentityGeneration::Always),
        Some("BY DEFAULT") => Some(IdentityGeneration::ByDefault),
        _ => None,
    }
}

pub fn map_definition(
    table: QualifiedName,
    raw: Vec<RawColumn>,
    primary_key: Vec<String>,
) -> TableDefinition {
    let columns = raw
        .into_iter()
        .map(|column| ColumnDefinition {
            ordinal_position: column.ordinal_position,
            name: column.name,
            data_type: column.data_type,
            is_nullable: column.is_nullable,
            identity: identity_from_text(column.identity_generation.as_deref()),
            default: column.default,
        })
        .collect();
    TableDefinition {
        table,
        columns,
        primary_key,
    }
}

/// Date and time types are read as text so they keep Postgres' own formatting.
fn is_temporal(data_type: &str) -> bool {
    data_type.starts_with("timestamp")
        || data_type.starts_with("time ")
        || data_type == "time"
        || data_type == "date"
        || data_type == "interval"
}

fn projection(columns: &[&ColumnDefinition]) -> String {
    columns
        .iter()
        .map(|column| {
            let name = quote_ident(&column.name);
            if is_temporal(&column.data_type) {
                format!("{name}::text AS {name}")
            } else {
                name
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns of `query` in selection order, failing on unknown names.
pub fn selected_columns<'d>(
    definition: &'d TableDefinition,
    query: &SelectQuery,
) -> Result<Vec<&'d ColumnDefinition>> {
    if query.columns.is_empty() {
        return Ok(definition.columns.iter().collect());
    }
    query
        .columns
        .iter()
        .map(|name| {
            definition
                .columns
                .iter()
                .find(|column| column.name == *name)
                .ok_or_else(|| {
                    Error::Db(format!(
                        "column \"{name}\" does not exist in {}",
                        definition.table
                    ))
                })
        })
        .collect()
}

/// Ordered, windowed rows of the table; `DISTINCT` applies to the window.
fn windowed_sql(definition: &TableDefinition, query: &SelectQuery) -> String {
    let mut sql = format!("SELECT * FROM {}", definition.table.to_sql());
    if !query.order_by.is_empty() {
        let order = query
            .order_by
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    if let Some(window) = query.window {
        if let Some(limit) = window.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if window.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", window.offset));
        }
    }
    sql
}

pub fn select_sql(
    definition: &TableDefinition,
    columns: &[&ColumnDefinition],
    query: &SelectQuery,
) -> String {
    let distinct = if query.distinct { "DISTINCT " } else { "" };
    format!(
        "SELECT row_to_json(r)::text FROM (SELECT {distinct}{} FROM ({}) AS w) AS r",
        projection(columns),
        windowed_sql(definition, query)
    )
}

pub fn average_sql(definition: &TableDefinition, column: &str, query: &SelectQuery) -> String {
    format!(
        "SELECT AVG({})::float8 FROM ({}) AS w",
        quote_ident(column),
        windowed_sql(definition, query)
    )
}

/// `INSERT` of the given columns from a JSON array bound as `$1`.
pub fn insert_sql(table: &QualifiedName, columns: &[String]) -> String {
    let list = quoted_list(columns);
    format!(
        "INSERT INTO {table} ({list}) SELECT {list} FROM json_populate_recordset(NULL::{table}, $1::json)",
        table = table.to_sql()
    )
}

/// `UPDATE` matched on `key` from a JSON object bound as `$1`.
pub fn update_sql(table: &QualifiedName, key: &[String], columns: &[String]) -> String {
    let mut assigned: Vec<&String> = columns
        .iter()
        .filter(|column| !key.contains(column))
        .collect();
    if assigned.is_empty() {
        assigned = key.iter().collect();
    }
    let set = assigned
        .iter()
        .map(|column| {
            let name = quote_ident(column);
            format!("{name} = r.{name}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let matches = key
        .iter()
        .map(|column| {
            let name = quote_ident(column);
            format!("t.{name} = r.{name}")
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "UPDATE {table} AS t SET {set} FROM json_populate_record(NULL::{table}, $1::json) AS r WHERE {matches}",
        table = table.to_sql()
    )
}

pub fn insert_one_sql(table: &QualifiedName, columns: &[String]) -> String {
    let list = quoted_list(columns);
    format!(
        "INSERT INTO {table} ({list}) SELECT {list} FROM json_populate_record(NULL::{table}, $1::json)",
        table = table.to_sql()
    )
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode a `row_to_json` object into a row ordered like `columns`.
pub fn map_row(text: &str, columns: &[&ColumnDefinition]) -> Result<Row> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|err| Error::Db(err.to_string()))?;
    let mut row = Row::with_capacity(columns.len());
    for column in columns {
        let value = object
            .get(&column.name)
            .cloned()
            .map(Value::from_json)
            .unwrap_or(Value::Null);
        row.set(&column.name, value);
    }
    Ok(row)
}

/// Column names written by a batch, in first-seen order.
pub fn batch_columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !columns.iter().any(|known| known == column) {
                columns.push(column.to_string());
            }
        }
    }
    columns
}

pub fn rows_to_json(rows: &[Row]) -> String {
    serde_json::Value::Array(rows.iter().map(Row::to_json_object).collect()).to_string()
}

#[cfg(test)]
mod tests {
    use datamask_core::Window;

    use super::*;

    fn definition() -> TableDefinition {
        TableDefinition {
            table: QualifiedName::new(Some("public"), "dest_users"),
            columns: vec![
                ColumnDefinition::new(1, "id", "integer"),
                ColumnDefinition::new(2, "email", "text"),
                ColumnDefinition::new(3, "created_at", "timestamp without time zone"),
            ],
            primary_key: vec!["id".to_string()],
        }
    }

    #[test]
    fn distinct_applies_after_the_window() {
        let definition = definition();
        let query = SelectQuery::table("users")
            .columns(["email"])
            .distinct()
            .order_by(&["id".to_string()])
            .window(Some(Window::new(20, Some(10))));
        let columns = selected_columns(&definition, &query).expect("columns");
        assert_eq!(
            select_sql(&definition, &columns, &query),
            "SELECT row_to_json(r)::text FROM (SELECT DISTINCT \"email\" FROM \
             (SELECT * FROM \"public\".\"dest_users\" ORDER BY \"id\" LIMIT 10 OFFSET 20) AS w) AS r"
        );
    }

    #[test]
    fn temporal_columns_are_read_as_text() {
        let definition = definition();
        let query = SelectQuery::table("users");
        let columns = selected_columns(&definition, &query).expect("columns");
        let sql = select_sql(&definition, &columns, &query);
        assert!(sql.contains("\"created_at\"::text AS \"created_at\""));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let query = SelectQuery::table("users").columns(["nope"]);
        assert!(selected_columns(&definition(), &query).is_err());
    }

    #[test]
    fn update_sets_every_non_key_column() {
        let table = QualifiedName::new(Some("public"), "dest_users");
        let sql = update_sql(
            &table,
            &["id".to_string()],
            &["id".to_string(), "email".to_string()],
        );
        assert!(sql.starts_with("UPDATE \"public\".\"dest_users\" AS t SET \"email\" = r.\"email\""));
        assert!(sql.ends_with("WHERE t.\"id\" = r.\"id\""));
    }

    #[test]
    fn rows_follow_selected_column_order() {
        let definition = definition();
        let query = SelectQuery::table("users").columns(["email", "id"]);
        let columns = selected_columns(&definition, &query).expect("columns");
        let row = map_row(r#"{"id": 3, "email": "a@x"}"#, &columns).expect("row");
        let names: Vec<&str> = row.columns().collect();
        assert_eq!(names, ["email", "id"]);
        assert_eq!(row.get("id"), Some(&Value::Int(3)));
    }
}
