//! Post-run consistency checker.
//!
//! Flags destination rows whose transformed columns still equal a source
//! row's values. The comparison is all-pairs and meant for moderate tables.

use std::sync::Arc;

use datamask_core::{DataStore, Row, SelectQuery, Value};
use tracing::info;

use crate::errors::{AnonymizeError, Result};
use crate::report::{CheckReport, DuplicatePair};

pub struct Checker {
    source: Arc<dyn DataStore>,
    destination: Arc<dyn DataStore>,
    table: Option<String>,
    comparable_columns: Vec<String>,
}

impl Checker {
    pub fn new(source: Arc<dyn DataStore>, destination: Arc<dyn DataStore>) -> Self {
        Self {
            source,
            destination,
            table: None,
            comparable_columns: Vec::new(),
        }
    }

    pub fn set_table_name(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn set_comparable_columns(&mut self, columns: Vec<String>) -> &mut Self {
        self.comparable_columns = columns;
        self
    }

    pub async fn check(&self) -> Result<CheckReport> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| AnonymizeError::Check("no table set".to_string()))?;
        if self.comparable_columns.is_empty() {
            return Err(AnonymizeError::Check(format!(
                "no comparable columns for table '{table}'"
            )));
        }

        let mut report = CheckReport {
            table: table.to_string(),
            comparable_columns: self.comparable_columns.clone(),
            duplicate_count: 0,
            pairs: Vec::new(),
            messages: vec![format!("Starting to check table {table}")],
        };

        let query = SelectQuery::table(table);
        let source_rows = self.source.select(&query).await?;
        let destination_rows = self.destination.select(&query).await?;

        for source_row in &source_rows {
            for destination_row in &destination_rows {
                if !self.is_duplicate(source_row, destination_row) {
                    continue;
                }
                report.duplicate_count += 1;
                report
                    .messages
                    .push(format!("Row is duplicate - {}", describe(source_row)));
                report
                    .messages
                    .push(format!(" \t with row - {}", describe(destination_row)));
                report.pairs.push(DuplicatePair {
                    source: source_row.clone(),
                    destination: destination_row.clone(),
                });
            }
        }
        report
            .messages
            .push(format!("Total duplicates found - {}", report.duplicate_count));

        info!(
            table,
            source_rows = source_rows.len(),
            destination_rows = destination_rows.len(),
            duplicates = report.duplicate_count,
            "check_finished"
        );
        Ok(report)
    }

    fn is_duplicate(&self, source: &Row, destination: &Row) -> bool {
        self.comparable_columns.iter().all(|column| {
            let left = source.get(column).unwrap_or(&Value::Null);
            let right = destination.get(column).unwrap_or(&Value::Null);
            (left.is_null() && right.is_null()) || left.loosely_equals(right)
        })
    }
}

fn describe(row: &Row) -> String {
    row.to_json_object().to_string()
}
