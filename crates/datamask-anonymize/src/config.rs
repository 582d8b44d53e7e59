//! Declarative table configuration.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::anonymizer::{Anonymizer, RuleBuilder};
use crate::report::FailurePolicy;
use crate::rules::Rule;

/// Run-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunSettings {
    /// Seed for deterministic randomness; each table derives its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub reconcile_schema: bool,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Directory receiving run artifacts.
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            seed: None,
            reconcile_schema: true,
            on_failure: FailurePolicy::default(),
            run_dir: default_run_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("runs")
}

/// Rules for one table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub truncate: bool,
    /// `false` updates rows matched by primary key instead of inserting.
    #[serde(default = "default_true")]
    pub insert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Row-count limit counted from `offset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Run the consistency checker after the table is written.
    #[serde(default)]
    pub check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

/// Ordered rules for one column. An empty list declares the column untouched.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl TableConfig {
    /// Declare this table's settings and rules on `anonymizer`.
    pub fn apply(&self, anonymizer: &mut Anonymizer) {
        if !self.primary_key.is_empty() {
            anonymizer.set_primary_key(self.primary_key.iter().cloned());
        }
        anonymizer
            .set_truncate_destination(self.truncate)
            .set_insert_mode(self.insert)
            .set_check_table(self.check);
        if let Some(size) = self.chunk_size {
            anonymizer.set_chunk_size(size);
        }
        if let Some(offset) = self.offset {
            anonymizer.set_offset(offset);
        }
        if let Some(limit) = self.limit {
            anonymizer.set_row_count_limit(limit);
        }
        if let Some(seed) = self.seed {
            anonymizer.set_seed(seed);
        }
        for column in &self.columns {
            anonymizer.column(&column.name);
            for rule in &column.rules {
                anonymizer.add_rule(rule.clone());
            }
        }
    }
}
