use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use datamask_core::Row;

/// Summary of one anonymized table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub write_mode: WriteMode,
    pub chunks: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    /// Offset reached after the last chunk.
    pub final_offset: u64,
    pub duration_ms: u64,
}

/// How a batch reaches the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Plain insert into a truncated table, keys included.
    Insert,
    /// Insert without the single-column primary key.
    Append,
    /// Update-or-insert by primary key in one transaction per chunk.
    Upsert,
}

/// What schema reconciliation did per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Destination already matched the source.
    pub kept: Vec<String>,
    /// Destination was missing and created.
    pub created: Vec<String>,
    /// Destination differed, was dropped and created again.
    pub recreated: Vec<String>,
    /// Source table missing; dropped from the run.
    pub skipped: Vec<String>,
}

/// A source row and the destination row it was not distinguishable from.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub source: Row,
    pub destination: Row,
}

/// Consistency checker result for one table.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub table: String,
    pub comparable_columns: Vec<String>,
    pub duplicate_count: u64,
    pub pairs: Vec<DuplicatePair>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// What to do with destination tables when a run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave whatever was written in place.
    #[default]
    KeepPartial,
    /// Truncate the destination tables the run filled from empty.
    ///
    /// Only tables written in [`WriteMode::Insert`] are truncated; append and
    /// upsert tables held rows before the run and are left as they are.
    TruncateWritten,
}

/// Report for a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    pub tables: Vec<TableReport>,
    pub checks: Vec<CheckReport>,
    /// Tables not processed because an earlier table failed.
    pub abandoned: Vec<String>,
    /// Destination tables truncated by [`FailurePolicy::TruncateWritten`].
    pub rolled_back: Vec<String>,
    /// Written tables the failure policy could not undo.
    pub not_rolled_back: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            reconcile: None,
            tables: Vec::new(),
            checks: Vec::new(),
            abandoned: Vec::new(),
            rolled_back: Vec::new(),
            not_rolled_back: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    pub fn rows_written(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_written).sum()
    }
}
