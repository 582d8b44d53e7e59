//! Row execution engine.

use std::sync::Arc;

use datamask_core::{Row, Value};
use rand::Rng;
use rand::seq::IndexedRandom;
use rand_chacha::ChaCha8Rng;

use crate::errors::{AnonymizeError, Result};
use crate::faker::ValueSource;
use crate::registry::{Registry, Step};
use crate::rules::{ColumnContext, Rule};
use crate::staged::StagedData;
use crate::transform;

/// Applies a table's per-row steps to one bound row at a time.
///
/// Owns the table's staged data and random generator so prepare steps and
/// per-row steps share both.
pub struct RowModifier {
    registry: Registry,
    staged: StagedData,
    rng: ChaCha8Rng,
    values: Arc<dyn ValueSource>,
    row: Option<Row>,
}

impl RowModifier {
    pub fn new(registry: Registry, rng: ChaCha8Rng, values: Arc<dyn ValueSource>) -> Self {
        Self {
            registry,
            staged: StagedData::new(),
            rng,
            values,
            row: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn staged(&self) -> &StagedData {
        &self.staged
    }

    /// Staged data and generator, borrowed together for prepare steps.
    pub fn prepare_parts(&mut self) -> (&Registry, &mut StagedData, &mut ChaCha8Rng) {
        (&self.registry, &mut self.staged, &mut self.rng)
    }

    pub fn set_row(&mut self, row: Row) -> &mut Self {
        self.row = Some(row);
        self
    }

    pub fn take_row(&mut self) -> Option<Row> {
        self.row.take()
    }

    /// Apply every column's steps in order, then the row hooks.
    pub fn run(&mut self) -> Result<&mut Self> {
        let mut row = self.row.take().ok_or(AnonymizeError::RowNotBound)?;
        let columns: Vec<String> = row.columns().map(str::to_string).collect();
        for column in &columns {
            for id in self.registry.column_steps(column) {
                let Some(step) = self.registry.step(*id) else {
                    continue;
                };
                apply_step(
                    step,
                    &mut row,
                    &mut self.staged,
                    &mut self.rng,
                    self.values.as_ref(),
                )?;
            }
        }
        for hook in &self.registry.after {
            hook.apply(&mut row)?;
        }
        self.row = Some(row);
        Ok(self)
    }
}

fn apply_step(
    step: &Step,
    row: &mut Row,
    staged: &mut StagedData,
    rng: &mut ChaCha8Rng,
    values: &dyn ValueSource,
) -> Result<()> {
    let column = step.column.as_str();
    let current = row.get(column).cloned().unwrap_or(Value::Null);
    let rule_error = |message: String| AnonymizeError::rule(column, step.rule.name(), message);

    let value = match &step.rule {
        Rule::Replace { value } => value.clone(),
        Rule::Fake { kind } => values.generate(*kind, rng),
        Rule::Sample { values } => values.choose(rng).cloned().unwrap_or(Value::Null),
        Rule::YesNo {
            yes,
            no,
            probability,
        } => {
            if rng.random_bool(*probability) {
                yes.clone()
            } else {
                no.clone()
            }
        }
        Rule::ShuffleUnique { .. } => staged.sample(step.id, column, rng)?,
        Rule::ShuffleAll => staged.pop(step.id, column)?,
        Rule::NumberVariance {
            amplitude,
            distribution,
        } => transform::number_variance(&current, *amplitude, *distribution, rng)
            .map_err(rule_error)?,
        Rule::RelativeNumberVariance {
            percent,
            distribution,
        } => transform::relative_number_variance(&current, *percent, *distribution, rng)
            .map_err(rule_error)?,
        Rule::DateInterval { start, end, format } => {
            transform::date_interval(start, end, format, rng).map_err(rule_error)?
        }
        Rule::DateShift {
            unit,
            amplitude,
            distribution,
            format,
        } => transform::date_shift(&current, *unit, *amplitude, *distribution, format, rng)
            .map_err(rule_error)?,
        Rule::UniqueConstraints { .. } => {
            for (group_column, value) in staged.pop_tuple(step.id, column)? {
                row.set(&group_column, value);
            }
            return Ok(());
        }
        Rule::Aggregate => match staged.scalar(step.id, column)? {
            Value::Float(average) => transform::same_numeric_kind(&current, average),
            other => other,
        },
        Rule::Mask {
            template,
            mask_char,
        } => transform::mask(&current, template, *mask_char),
        Rule::RandomMask {
            alphabet,
            template,
            mask_char,
        } => transform::random_mask(&current, alphabet, template, *mask_char, rng),
        Rule::Custom(custom) => {
            let mut ctx = ColumnContext {
                column,
                value: &current,
                row,
                rng,
                values,
            };
            custom.apply(&mut ctx)?
        }
    };
    row.set(column, value);
    Ok(())
}
