//! Destination schema reconciliation.

use tracing::{debug, info};

use crate::errors::Result;
use crate::manager::ConnectionSet;
use crate::report::ReconcileReport;

/// Recreates destination tables whose columns drifted from the source.
pub struct SchemaReconciler<'a> {
    connections: &'a ConnectionSet,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(connections: &'a ConnectionSet) -> Self {
        Self { connections }
    }

    /// Reconcile every table in `tables`, in order.
    pub async fn reconcile(&self, tables: &[String]) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for table in tables {
            self.reconcile_table(table, &mut report).await?;
        }
        info!(
            kept = report.kept.len(),
            created = report.created.len(),
            recreated = report.recreated.len(),
            skipped = report.skipped.len(),
            "schema_reconciled"
        );
        Ok(report)
    }

    async fn reconcile_table(&self, table: &str, report: &mut ReconcileReport) -> Result<()> {
        let ConnectionSet {
            source,
            destination,
            catalog,
        } = self.connections;

        if !source.has_table(table).await? {
            debug!(table, "source table missing, skipping");
            report.skipped.push(table.to_string());
            return Ok(());
        }

        let mut recreated = false;
        if destination.has_table(table).await? {
            let diff = catalog
                .column_diff(&source.qualify(table), &destination.qualify(table))
                .await?;
            if diff == 0 {
                debug!(table, "destination matches source");
                report.kept.push(table.to_string());
                return Ok(());
            }
            info!(table, missing_columns = diff, "dropping drifted destination table");
            destination.drop_table(table).await?;
            recreated = true;
        }

        let definition = source
            .table_definition(table)
            .await?
            .renamed(destination.qualify(table));
        destination.create_table(&definition).await?;
        if recreated {
            report.recreated.push(table.to_string());
        } else {
            report.created.push(table.to_string());
        }
        Ok(())
    }
}
