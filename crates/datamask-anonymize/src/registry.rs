//! Callback registry assembled from a table's column rules.

use std::collections::{BTreeSet, HashMap};

use crate::rules::{PrepareScope, Rule, RowHook};

/// Identifier of one registered step; also keys its staged data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(crate) usize);

/// A rule bound to the column that declared it.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub column: String,
    pub rule: Rule,
}

impl Step {
    /// Columns this step writes, anchor first.
    pub fn written_columns(&self) -> Vec<String> {
        let mut columns = vec![self.column.clone()];
        if let Rule::UniqueConstraints { columns: group, .. } = &self.rule {
            columns.extend(group.iter().cloned());
        }
        columns
    }
}

/// Steps declared for one column while it is the open column.
#[derive(Debug, Clone)]
pub struct ColumnRules {
    pub name: String,
    pub prepare: Vec<StepId>,
    pub prepare_chunked: Vec<StepId>,
    pub per_row: Vec<StepId>,
}

impl ColumnRules {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prepare: Vec::new(),
            prepare_chunked: Vec::new(),
            per_row: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, step: &Step) {
        match step.rule.prepare_scope() {
            Some(PrepareScope::Table) => self.prepare.push(step.id),
            Some(PrepareScope::Chunk) => self.prepare_chunked.push(step.id),
            None => {}
        }
        self.per_row.push(step.id);
    }
}

/// The three callback buckets plus row hooks.
///
/// Merging concatenates lists under matching keys; nothing is overwritten.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    steps: Vec<Step>,
    pub prepare: Vec<StepId>,
    pub prepare_chunked: Vec<StepId>,
    /// Per-row steps by column, in declaration order.
    pub column: HashMap<String, Vec<StepId>>,
    pub after: Vec<RowHook>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, rules: ColumnRules) {
        self.prepare.extend(rules.prepare);
        self.prepare_chunked.extend(rules.prepare_chunked);
        if !rules.per_row.is_empty() {
            self.column
                .entry(rules.name)
                .or_default()
                .extend(rules.per_row);
        }
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.0)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn column_steps(&self, column: &str) -> &[StepId] {
        self.column.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Columns with at least one per-row step.
    pub fn transformed_columns(&self) -> BTreeSet<String> {
        self.column
            .iter()
            .filter(|(_, steps)| !steps.is_empty())
            .map(|(column, _)| column.clone())
            .collect()
    }

    /// Strip every step on the non-anchor columns of each constraint group.
    ///
    /// A group column cannot also be transformed on its own; the anchor's
    /// steps stay since the anchor emits the group.
    pub(crate) fn bind_constraint_groups(&mut self) {
        let mut bound = BTreeSet::new();
        for id in self.column.values().flatten() {
            let Some(step) = self.steps.get(id.0) else {
                continue;
            };
            if let Rule::UniqueConstraints { columns, .. } = &step.rule {
                bound.extend(columns.iter().filter(|c| **c != step.column).cloned());
            }
        }
        if bound.is_empty() {
            return;
        }

        let steps = &self.steps;
        let on_bound = |id: &StepId| {
            steps
                .get(id.0)
                .is_some_and(|step| bound.contains(&step.column))
        };
        self.prepare.retain(|id| !on_bound(id));
        self.prepare_chunked.retain(|id| !on_bound(id));
        self.column.retain(|column, _| !bound.contains(column));
    }
}
