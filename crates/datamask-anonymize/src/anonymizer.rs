//! Per-table column rule builder.

use std::collections::BTreeSet;

use datamask_core::Window;

use crate::errors::{AnonymizeError, Result};
use crate::registry::{ColumnRules, Registry, Step, StepId};
use crate::rules::{Rule, RowHook};

/// Row-count limit above which a table is always chunked.
pub const MAX_CHUNK_SIZE: u64 = 10_000;

/// Capability the function library builds on.
pub trait RuleBuilder {
    /// Open a new column context, finalizing the previous one.
    fn column(&mut self, name: &str) -> &mut Self;

    /// Append a rule to the open column.
    fn add_rule(&mut self, rule: Rule) -> &mut Self;

    /// Register a hook run after every row.
    fn after_row(&mut self, hook: RowHook) -> &mut Self;

    /// Finalize the open column and assemble the registry.
    fn callbacks(&mut self) -> Result<Registry>;
}

/// Paging state of a table run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkState {
    chunk_size: Option<u64>,
    offset: u64,
    limit: Option<u64>,
    /// `initial offset + limit`, fixed at finalization.
    count: Option<u64>,
}

impl ChunkState {
    pub fn chunk_size(&self) -> Option<u64> {
        self.chunk_size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Whether reads are paged at all.
    pub fn is_chunked(&self) -> bool {
        self.chunk_size.is_some()
    }

    fn fix_count(&mut self) {
        if let Some(limit) = self.limit {
            self.count = Some(self.offset + limit);
            if limit > MAX_CHUNK_SIZE {
                self.chunk_size = Some(MAX_CHUNK_SIZE);
            } else if self.chunk_size.is_none() {
                self.chunk_size = Some(limit);
            }
        }
    }

    /// Window of the next read; `None` reads the whole table.
    pub fn window(&self) -> Option<Window> {
        let remaining = self.count.map(|count| count.saturating_sub(self.offset));
        let limit = match (self.chunk_size, remaining) {
            (Some(chunk), Some(remaining)) => Some(chunk.min(remaining)),
            (Some(chunk), None) => Some(chunk),
            (None, remaining) => remaining,
        };
        if limit.is_none() && self.offset == 0 {
            return None;
        }
        Some(Window::new(self.offset, limit))
    }

    pub fn advance(&mut self, processed: u64) {
        self.offset += processed;
    }

    /// Whether another read should follow the chunk just processed.
    pub fn continues(&self) -> bool {
        (self.count.is_some() || self.chunk_size.is_some())
            && self.count.is_none_or(|count| count > self.offset)
    }
}

/// Column rule builder for one table.
#[derive(Debug)]
pub struct Anonymizer {
    table: String,
    steps: Vec<Step>,
    current: Option<ColumnRules>,
    declared: Vec<ColumnRules>,
    declared_columns: Vec<String>,
    primary_key: Vec<String>,
    key_group: Option<Step>,
    after: Vec<RowHook>,
    truncate: bool,
    insert: bool,
    check_table: bool,
    seed: Option<u64>,
    chunk: ChunkState,
    errors: Vec<String>,
}

impl Anonymizer {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            steps: Vec::new(),
            current: None,
            declared: Vec::new(),
            declared_columns: Vec::new(),
            primary_key: Vec::new(),
            key_group: None,
            after: Vec::new(),
            truncate: false,
            insert: true,
            check_table: false,
            seed: None,
            chunk: ChunkState::default(),
            errors: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Alias of [`RuleBuilder::column`].
    pub fn select_column(&mut self, name: &str) -> &mut Self {
        self.column(name)
    }

    /// Accepts one column or a list; a composite key also binds its columns
    /// into a non-shuffled group anchored on the last key column.
    pub fn set_primary_key<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self.key_group = match self.primary_key.split_last() {
            Some((anchor, rest)) if !rest.is_empty() => Some(Step {
                id: StepId(usize::MAX),
                column: anchor.clone(),
                rule: Rule::UniqueConstraints {
                    columns: rest.to_vec(),
                    shuffle: false,
                },
            }),
            _ => None,
        };
        self
    }

    pub fn set_truncate_destination(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    pub fn set_insert_mode(&mut self, insert: bool) -> &mut Self {
        self.insert = insert;
        self
    }

    pub fn set_chunk_size(&mut self, size: u64) -> &mut Self {
        self.chunk.chunk_size = (size > 0).then_some(size);
        self
    }

    pub fn set_offset(&mut self, offset: u64) -> &mut Self {
        self.chunk.offset = offset;
        self
    }

    pub fn set_row_count_limit(&mut self, limit: u64) -> &mut Self {
        self.chunk.limit = Some(limit);
        self
    }

    pub fn set_check_table(&mut self, check: bool) -> &mut Self {
        self.check_table = check;
        self
    }

    /// Seed for this table's random steps; overrides the run seed.
    pub fn set_seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn is_truncate_destination(&self) -> bool {
        self.truncate
    }

    pub fn is_insert(&self) -> bool {
        self.insert
    }

    pub fn is_check_table(&self) -> bool {
        self.check_table
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Chunk state with the row-count limit applied.
    pub fn chunk_state(&self) -> ChunkState {
        let mut chunk = self.chunk;
        chunk.fix_count();
        chunk
    }

    /// Columns opened with [`RuleBuilder::column`], in declaration order.
    pub fn declared_columns(&self) -> &[String] {
        &self.declared_columns
    }

    /// Configuration errors recorded while declaring rules.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub(crate) fn take_error(&self) -> Result<()> {
        match self.errors.first() {
            Some(message) => Err(AnonymizeError::Config(format!(
                "table '{}': {message}",
                self.table
            ))),
            None => Ok(()),
        }
    }

    /// Transformed columns minus the primary key; what the checker compares.
    pub fn columns_eligible_for_check(&mut self) -> Result<Vec<String>> {
        let registry = self.callbacks()?;
        let key: BTreeSet<&String> = self.primary_key.iter().collect();
        Ok(registry
            .transformed_columns()
            .into_iter()
            .filter(|column| !key.contains(column))
            .collect())
    }

    /// Reject write modes that cannot run, before any data moves.
    pub fn validate_write_mode(&self) -> Result<()> {
        if self.truncate {
            return Ok(());
        }
        if self.insert && self.primary_key.len() > 1 {
            return Err(AnonymizeError::Config(format!(
                "table '{}': composite primary key {:?} requires truncating the destination",
                self.table, self.primary_key
            )));
        }
        if !self.insert && self.primary_key.is_empty() {
            return Err(AnonymizeError::Config(format!(
                "table '{}': update mode requires a primary key",
                self.table
            )));
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(current) = self.current.take() {
            self.declared.push(current);
        }
    }
}

impl RuleBuilder for Anonymizer {
    fn column(&mut self, name: &str) -> &mut Self {
        self.flush();
        if !self.declared_columns.iter().any(|column| column == name) {
            self.declared_columns.push(name.to_string());
        }
        self.current = Some(ColumnRules::new(name));
        self
    }

    fn add_rule(&mut self, rule: Rule) -> &mut Self {
        let rule_name = rule.name().to_string();
        let Some(current) = self.current.as_mut() else {
            self.errors.push(format!(
                "rule '{rule_name}' registered with no column selected"
            ));
            return self;
        };
        match rule.normalize() {
            Ok(Some(rule)) => {
                if let Rule::UniqueConstraints { columns, .. } = &rule {
                    if columns.iter().any(|column| *column == current.name) {
                        self.errors.push(format!(
                            "column '{}': constraint group repeats its anchor column",
                            current.name
                        ));
                        return self;
                    }
                }
                let step = Step {
                    id: StepId(self.steps.len()),
                    column: current.name.clone(),
                    rule,
                };
                current.push(&step);
                self.steps.push(step);
            }
            Ok(None) => {}
            Err(message) => self.errors.push(format!(
                "column '{}', rule '{rule_name}': {message}",
                current.name
            )),
        }
        self
    }

    fn after_row(&mut self, hook: RowHook) -> &mut Self {
        self.after.push(hook);
        self
    }

    /// Idempotent: repeated calls assemble the same registry.
    fn callbacks(&mut self) -> Result<Registry> {
        self.flush();
        self.take_error()?;

        let mut steps = self.steps.clone();
        let key_group = self.key_group.clone().map(|mut step| {
            step.id = StepId(steps.len());
            steps.push(step.clone());
            step
        });

        let mut registry = Registry::with_steps(steps);
        if let Some(step) = key_group {
            // Key group runs first so the anchor's own rules still apply after it.
            let mut rules = ColumnRules::new(step.column.clone());
            rules.push(&step);
            registry.merge(rules);
        }
        for rules in &self.declared {
            registry.merge(rules.clone());
        }
        registry.after = self.after.clone();
        registry.bind_constraint_groups();
        Ok(registry)
    }
}
