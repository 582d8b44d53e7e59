//! Chunked pipeline orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use datamask_core::{Catalog, DataStore, Row, SelectQuery};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use crate::anonymizer::{Anonymizer, RuleBuilder};
use crate::checker::Checker;
use crate::errors::{AnonymizeError, Result};
use crate::faker::{FakeSource, ValueSource};
use crate::helpers::hash_seed;
use crate::prepare::{PrepareContext, run_prepare_steps};
use crate::report::{
    CheckReport, FailurePolicy, ReconcileReport, RunReport, RunStatus, TableReport, WriteMode,
};
use crate::row_modifier::RowModifier;
use crate::schema_sync::SchemaReconciler;

/// The named connections a run uses.
#[derive(Clone)]
pub struct ConnectionSet {
    pub source: Arc<dyn DataStore>,
    pub destination: Arc<dyn DataStore>,
    pub catalog: Arc<dyn Catalog>,
}

/// Drives reconciliation, the per-table chunk loop and the checker.
pub struct Manager {
    connections: ConnectionSet,
    tables: Vec<Anonymizer>,
    values: Arc<dyn ValueSource>,
    seed: Option<u64>,
    reconcile: bool,
    failure_policy: FailurePolicy,
    run_id: Option<String>,
}

impl Manager {
    pub fn new(connections: ConnectionSet) -> Self {
        Self {
            connections,
            tables: Vec::new(),
            values: Arc::new(FakeSource),
            seed: None,
            reconcile: true,
            failure_policy: FailurePolicy::default(),
            run_id: None,
        }
    }

    pub fn with_value_source(mut self, values: Arc<dyn ValueSource>) -> Self {
        self.values = values;
        self
    }

    /// Run seed; each table derives its own generator from it.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Whether [`Manager::run`] reconciles the destination schema first.
    pub fn with_schema_reconciliation(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Fixed run id; a fresh UUID is drawn per run otherwise.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Declare a table's rules; redeclaring a table replaces it in place.
    pub fn table<F>(&mut self, name: &str, setup: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Anonymizer),
    {
        let mut anonymizer = Anonymizer::new(name);
        setup(&mut anonymizer);
        anonymizer.callbacks()?;
        self.add_table(anonymizer);
        Ok(self)
    }

    /// Add a fully declared table, replacing one with the same name.
    pub fn add_table(&mut self, anonymizer: Anonymizer) -> &mut Self {
        match self
            .tables
            .iter_mut()
            .find(|existing| existing.table() == anonymizer.table())
        {
            Some(existing) => *existing = anonymizer,
            None => self.tables.push(anonymizer),
        }
        self
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|anonymizer| anonymizer.table().to_string())
            .collect()
    }

    /// Reconcile destination tables; tables missing at the source leave the run.
    pub async fn reconcile_schema(&mut self) -> Result<ReconcileReport> {
        let names = self.table_names();
        let report = SchemaReconciler::new(&self.connections)
            .reconcile(&names)
            .await?;
        self.tables
            .retain(|anonymizer| !report.skipped.iter().any(|t| t == anonymizer.table()));
        Ok(report)
    }

    /// Run every table in declaration order.
    ///
    /// The first error stops the run: remaining tables are abandoned, the
    /// failure policy is applied, and the report comes back `Failed`.
    pub async fn run(&mut self) -> RunReport {
        let start = Instant::now();
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut report = RunReport::new(run_id.clone());
        let mut written = BTreeMap::new();

        info!(
            run_id = %run_id,
            tables = self.tables.len(),
            seed = self.seed,
            reconcile = self.reconcile,
            "run_started"
        );

        let mut position = None;
        let outcome = self
            .run_tables(&mut report, &mut written, &mut position)
            .await;

        if let Err(err) = outcome {
            error!(run_id = %run_id, error = %err, "run_failed");
            report.status = RunStatus::Failed;
            report.error = Some(err.to_string());
            let first_abandoned = position.map_or(0, |index| index + 1);
            report.abandoned = self
                .tables
                .iter()
                .skip(first_abandoned)
                .map(|anonymizer| anonymizer.table().to_string())
                .collect();
            match self.failure_policy {
                FailurePolicy::TruncateWritten => self.truncate_written(&written, &mut report).await,
                FailurePolicy::KeepPartial => {
                    report.not_rolled_back = written.into_keys().collect();
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            status = ?report.status,
            tables = report.tables.len(),
            rows_written = report.rows_written(),
            duration_ms = report.duration_ms,
            "run_finished"
        );
        report
    }

    async fn run_tables(
        &mut self,
        report: &mut RunReport,
        written: &mut BTreeMap<String, WriteMode>,
        position: &mut Option<usize>,
    ) -> Result<()> {
        if self.reconcile {
            report.reconcile = Some(self.reconcile_schema().await?);
        }
        for index in 0..self.tables.len() {
            *position = Some(index);
            let table = self.apply_changes(index, written).await?;
            report.tables.push(table);
            if let Some(check) = self.check_table(index).await? {
                report.checks.push(check);
            }
        }
        Ok(())
    }

    /// Truncate tables the run filled from empty; other modes stay untouched.
    async fn truncate_written(&self, written: &BTreeMap<String, WriteMode>, report: &mut RunReport) {
        for (table, mode) in written {
            if *mode != WriteMode::Insert {
                warn!(table = %table, write_mode = ?mode, "written rows kept after failure");
                report.not_rolled_back.push(table.clone());
                continue;
            }
            match self.connections.destination.truncate(table).await {
                Ok(()) => report.rolled_back.push(table.clone()),
                Err(err) => {
                    warn!(table = %table, error = %err, "failed to truncate after failure");
                    report.not_rolled_back.push(table.clone());
                }
            }
        }
    }

    /// Run the consistency checker for one table when requested.
    ///
    /// An incorrect checker state is recorded as a check without comparable
    /// columns and does not fail the run.
    async fn check_table(&mut self, index: usize) -> Result<Option<CheckReport>> {
        let anonymizer = &mut self.tables[index];
        if !anonymizer.is_check_table() {
            return Ok(None);
        }
        let table = anonymizer.table().to_string();
        let columns = anonymizer.columns_eligible_for_check()?;
        let mut checker = Checker::new(
            self.connections.source.clone(),
            self.connections.destination.clone(),
        );
        checker.set_table_name(&table).set_comparable_columns(columns);
        match checker.check().await {
            Ok(report) => Ok(Some(report)),
            Err(err @ AnonymizeError::Check(_)) => {
                warn!(table = %table, error = %err, "check_skipped");
                Ok(Some(CheckReport {
                    table,
                    comparable_columns: Vec::new(),
                    duplicate_count: 0,
                    pairs: Vec::new(),
                    messages: vec![err.to_string()],
                }))
            }
            Err(err) => Err(err),
        }
    }

    fn table_rng(&self, anonymizer: &Anonymizer) -> ChaCha8Rng {
        let seed = anonymizer
            .seed()
            .or_else(|| self.seed.map(|seed| hash_seed(seed, anonymizer.table())));
        match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    async fn apply_changes(
        &mut self,
        index: usize,
        written: &mut BTreeMap<String, WriteMode>,
    ) -> Result<TableReport> {
        let start = Instant::now();
        let rng = self.table_rng(&self.tables[index]);
        let anonymizer = &mut self.tables[index];
        let table = anonymizer.table().to_string();
        let registry = anonymizer.callbacks()?;
        anonymizer.validate_write_mode()?;

        let source = self.connections.source.as_ref();
        let destination = self.connections.destination.as_ref();
        let write_mode = write_mode(anonymizer);
        let key = anonymizer.primary_key().to_vec();
        let order_by = read_order(source, &table, &key).await?;
        let mut chunk = anonymizer.chunk_state();
        let chunked_steps = registry.prepare_chunked.clone();
        let table_steps = registry.prepare.clone();

        info!(
            table = %table,
            write_mode = ?write_mode,
            chunk_size = chunk.chunk_size(),
            offset = chunk.offset(),
            count = chunk.count(),
            order_by = ?order_by,
            "table_started"
        );

        let mut modifier = RowModifier::new(registry, rng, self.values.clone());
        {
            let ctx = PrepareContext {
                source,
                table: &table,
                order_by: &order_by,
                window: None,
            };
            let (registry, staged, rng) = modifier.prepare_parts();
            run_prepare_steps(&ctx, &table_steps, registry, staged, rng).await?;
        }

        if anonymizer.is_truncate_destination() {
            destination.truncate(&table).await?;
            debug!(table = %table, "destination truncated");
        }

        let mut chunks = 0_u64;
        let mut rows_read = 0_u64;
        let mut rows_written = 0_u64;
        loop {
            let window = chunk.window();
            if window.is_some_and(|window| window.limit == Some(0)) {
                break;
            }
            let query = SelectQuery::table(&table).order_by(&order_by).window(window);
            let rows = source.select(&query).await?;
            if rows.is_empty() {
                break;
            }

            let ctx = PrepareContext {
                source,
                table: &table,
                order_by: &order_by,
                window,
            };
            {
                let (registry, staged, rng) = modifier.prepare_parts();
                run_prepare_steps(&ctx, &chunked_steps, registry, staged, rng).await?;
            }

            let processed = rows.len() as u64;
            let mut batch = Vec::with_capacity(rows.len());
            for row in rows {
                let row = modifier
                    .set_row(row)
                    .run()?
                    .take_row()
                    .ok_or(AnonymizeError::RowNotBound)?;
                batch.push(row);
            }
            modifier.staged().ensure_drained(&chunked_steps)?;

            written.insert(table.clone(), write_mode);
            let count = write_batch(destination, &table, &key, write_mode, batch).await?;

            chunks += 1;
            rows_read += processed;
            rows_written += count;
            chunk.advance(processed);
            info!(
                table = %table,
                chunk = chunks,
                rows = processed,
                written = count,
                offset = chunk.offset(),
                "chunk_written"
            );

            if !chunk.continues() {
                break;
            }
        }

        let report = TableReport {
            table: table.clone(),
            write_mode,
            chunks,
            rows_read,
            rows_written,
            final_offset: chunk.offset(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            table = %table,
            chunks,
            rows_written,
            duration_ms = report.duration_ms,
            "table_finished"
        );
        Ok(report)
    }
}

/// Windowed reads need a total order so fetches and prepares see the same rows.
///
/// Falls back from the declared key to the source primary key, then to every
/// column.
async fn read_order(source: &dyn DataStore, table: &str, declared: &[String]) -> Result<Vec<String>> {
    if !declared.is_empty() {
        return Ok(declared.to_vec());
    }
    let definition = source.table_definition(table).await?;
    if definition.primary_key.is_empty() {
        Ok(definition.column_names())
    } else {
        Ok(definition.primary_key)
    }
}

fn write_mode(anonymizer: &Anonymizer) -> WriteMode {
    match (anonymizer.is_truncate_destination(), anonymizer.is_insert()) {
        (true, _) => WriteMode::Insert,
        (false, true) => WriteMode::Append,
        (false, false) => WriteMode::Upsert,
    }
}

async fn write_batch(
    destination: &dyn DataStore,
    table: &str,
    key: &[String],
    mode: WriteMode,
    mut rows: Vec<Row>,
) -> Result<u64> {
    let written = match mode {
        WriteMode::Insert => destination.insert(table, &rows).await?,
        WriteMode::Append => {
            match key {
                [] => {}
                [single] => {
                    for row in &mut rows {
                        row.remove(single);
                    }
                }
                _ => {
                    return Err(AnonymizeError::Config(format!(
                        "table '{table}': composite primary key requires truncating the destination"
                    )));
                }
            }
            destination.insert(table, &rows).await?
        }
        WriteMode::Upsert => destination.upsert(table, key, &rows).await?,
    };
    Ok(written)
}
