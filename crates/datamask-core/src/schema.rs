use std::fmt;

use serde::{Deserialize, Serialize};

/// Table identifier after a connection applied its schema and table prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
        }
    }

    /// Quoted SQL form, e.g. `"public"."dest_users"`.
    pub fn to_sql(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Identity generation strategy for columns using `GENERATED ... AS IDENTITY`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityGeneration {
    Always,
    ByDefault,
}

/// Column of a table definition, as read from the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub ordinal_position: i16,
    pub name: String,
    /// Formatted SQL type (e.g. `character varying(255)`).
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub identity: Option<IdentityGeneration>,
}

impl ColumnDefinition {
    pub fn new(ordinal_position: i16, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            ordinal_position,
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            identity: None,
        }
    }
}

/// Structured `CREATE TABLE` for a source table.
///
/// Reconciliation copies this from the source connection and renames
/// `table` to the destination's naming before creating it there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table: QualifiedName,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn renamed(mut self, table: QualifiedName) -> Self {
        self.table = table;
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn to_create_sql(&self) -> String {
        let mut parts = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            parts.push(column_sql(column));
        }
        if !self.primary_key.is_empty() {
            let keys = self
                .primary_key
                .iter()
                .map(|key| quote_ident(key))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("PRIMARY KEY ({keys})"));
        }
        format!("CREATE TABLE {} (\n  {}\n)", self.table.to_sql(), parts.join(",\n  "))
    }
}

fn column_sql(column: &ColumnDefinition) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.data_type);
    // Sequence defaults belong to the source database; the copy gets its own identity.
    let sequence_default = column
        .default
        .as_deref()
        .is_some_and(|value| value.starts_with("nextval("));
    match (&column.identity, sequence_default) {
        (Some(IdentityGeneration::Always), _) => sql.push_str(" GENERATED ALWAYS AS IDENTITY"),
        (Some(IdentityGeneration::ByDefault), _) | (None, true) => {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY")
        }
        (None, false) => {
            if let Some(default) = &column.default {
                sql.push_str(" DEFAULT ");
                sql.push_str(default);
            }
        }
    }
    if !column.is_nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sql_uses_renamed_identifier() {
        let mut id = ColumnDefinition::new(1, "id", "integer");
        id.is_nullable = false;
        id.default = Some("nextval('users_id_seq'::regclass)".to_string());
        let mut email = ColumnDefinition::new(2, "email", "character varying(255)");
        email.default = Some("''::character varying".to_string());

        let definition = TableDefinition {
            table: QualifiedName::new(Some("public"), "users"),
            columns: vec![id, email],
            primary_key: vec!["id".to_string()],
        }
        .renamed(QualifiedName::new(Some("public"), "dest_users"));

        let sql = definition.to_create_sql();
        assert!(sql.starts_with("CREATE TABLE \"public\".\"dest_users\""));
        assert!(sql.contains("\"id\" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL"));
        assert!(sql.contains("\"email\" character varying(255) DEFAULT ''::character varying"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
