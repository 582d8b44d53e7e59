//! Staged column data populated by prepare steps and consumed per row.
//!
//! Buffers are consumed from the tail. A buffer built with
//! [`StagedBuffer::in_order`] stores its values reversed so that popping
//! yields them in the order they were read; this tail-order invariant is what
//! lets a non-shuffled constraint group pass rows through unchanged.

use std::collections::HashMap;

use datamask_core::Value;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::errors::{AnonymizeError, Result};
use crate::helpers::shuffle;
use crate::registry::StepId;

/// Ordered buffer with pop-from-tail consumption.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedBuffer {
    values: Vec<Value>,
}

impl StagedBuffer {
    /// Randomly permuted buffer; pops follow the permutation.
    pub fn shuffled<R: Rng + ?Sized>(mut values: Vec<Value>, rng: &mut R) -> Self {
        shuffle(&mut values, rng);
        Self { values }
    }

    /// Buffer whose pops yield `values` front to back.
    pub fn in_order(mut values: Vec<Value>) -> Self {
        values.reverse();
        Self { values }
    }

    /// Buffer that pops `values` back to front, exactly as given.
    fn from_tail_order(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Index-aligned buffers for the columns of one constraint group.
///
/// Every buffer receives one field of each tuple in the same order, so the
/// n-th pop of the group returns the n-th tuple's fields together.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBuffer {
    columns: Vec<String>,
    buffers: Vec<StagedBuffer>,
}

impl GroupBuffer {
    /// Permute the tuple list, then fan out.
    pub fn shuffled<R: Rng + ?Sized>(
        columns: Vec<String>,
        mut tuples: Vec<Vec<Value>>,
        rng: &mut R,
    ) -> Self {
        shuffle(&mut tuples, rng);
        Self::fan_out(columns, tuples)
    }

    /// Reverse the tuple list, then fan out, so pops return tuples in read order.
    pub fn in_order(columns: Vec<String>, mut tuples: Vec<Vec<Value>>) -> Self {
        tuples.reverse();
        Self::fan_out(columns, tuples)
    }

    fn fan_out(columns: Vec<String>, tuples: Vec<Vec<Value>>) -> Self {
        let mut fields: Vec<Vec<Value>> = columns
            .iter()
            .map(|_| Vec::with_capacity(tuples.len()))
            .collect();
        for tuple in tuples {
            let mut tuple = tuple.into_iter();
            for slot in fields.iter_mut() {
                slot.push(tuple.next().unwrap_or(Value::Null));
            }
        }
        let buffers = fields.into_iter().map(StagedBuffer::from_tail_order).collect();
        Self { columns, buffers }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Pop one value per group column in lock-step.
    ///
    /// Returns `None` when any buffer is exhausted; buffers are left untouched
    /// in that case.
    pub fn pop_tuple(&mut self) -> Option<Vec<(String, Value)>> {
        if self.buffers.iter().any(StagedBuffer::is_empty) {
            return None;
        }
        let mut tuple = Vec::with_capacity(self.columns.len());
        for (column, buffer) in self.columns.iter().zip(self.buffers.iter_mut()) {
            tuple.push((column.clone(), buffer.pop()?));
        }
        Some(tuple)
    }

    /// Largest number of values still staged in any group column.
    pub fn remaining(&self) -> usize {
        self.buffers.iter().map(StagedBuffer::len).max().unwrap_or(0)
    }
}

/// Staged value for one prepare step.
#[derive(Debug, Clone, PartialEq)]
pub enum Staged {
    /// Consumed exactly once per row.
    Stack(StagedBuffer),
    /// Sampled with replacement.
    Pool(Vec<Value>),
    /// Constraint group consumed in lock-step.
    Group(GroupBuffer),
    /// Single cached value, e.g. an aggregate.
    Scalar(Value),
}

/// Prepared column data keyed by the step that staged it.
#[derive(Debug, Default)]
pub struct StagedData {
    slots: HashMap<StepId, StagedSlot>,
}

#[derive(Debug)]
struct StagedSlot {
    column: String,
    staged: Staged,
    consumed: u64,
}

impl StagedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step: StepId, column: &str, staged: Staged) {
        self.slots.insert(
            step,
            StagedSlot {
                column: column.to_string(),
                staged,
                consumed: 0,
            },
        );
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.slots.contains_key(&step)
    }

    pub fn remove(&mut self, step: StepId) -> Option<Staged> {
        self.slots.remove(&step).map(|slot| slot.staged)
    }

    /// Pop the next value of a [`Staged::Stack`].
    pub fn pop(&mut self, step: StepId, column: &str) -> Result<Value> {
        let slot = self.slot_mut(step, column)?;
        match &mut slot.staged {
            Staged::Stack(buffer) => match buffer.pop() {
                Some(value) => {
                    slot.consumed += 1;
                    Ok(value)
                }
                None => Err(underflow(slot)),
            },
            other => Err(wrong_kind(column, "stack", other)),
        }
    }

    /// Pop the next tuple of a [`Staged::Group`].
    pub fn pop_tuple(&mut self, step: StepId, column: &str) -> Result<Vec<(String, Value)>> {
        let slot = self.slot_mut(step, column)?;
        match &mut slot.staged {
            Staged::Group(group) => match group.pop_tuple() {
                Some(tuple) => {
                    slot.consumed += 1;
                    Ok(tuple)
                }
                None => Err(underflow(slot)),
            },
            other => Err(wrong_kind(column, "group", other)),
        }
    }

    /// Sample one value of a [`Staged::Pool`] with replacement.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        step: StepId,
        column: &str,
        rng: &mut R,
    ) -> Result<Value> {
        let slot = self.slot_mut(step, column)?;
        match &slot.staged {
            Staged::Pool(values) => match values.choose(rng) {
                Some(value) => {
                    let value = value.clone();
                    slot.consumed += 1;
                    Ok(value)
                }
                None => Err(underflow(slot)),
            },
            other => Err(wrong_kind(column, "pool", other)),
        }
    }

    /// Read a [`Staged::Scalar`].
    pub fn scalar(&self, step: StepId, column: &str) -> Result<Value> {
        let slot = self
            .slots
            .get(&step)
            .ok_or_else(|| missing(column))?;
        match &slot.staged {
            Staged::Scalar(value) => Ok(value.clone()),
            other => Err(wrong_kind(column, "scalar", other)),
        }
    }

    /// Fail when a stack or group staged by one of `steps` was not fully consumed.
    pub fn ensure_drained(&self, steps: &[StepId]) -> Result<()> {
        for step in steps {
            let Some(slot) = self.slots.get(step) else {
                continue;
            };
            let remaining = match &slot.staged {
                Staged::Stack(buffer) => buffer.len(),
                Staged::Group(group) => group.remaining(),
                Staged::Pool(_) | Staged::Scalar(_) => 0,
            };
            if remaining > 0 {
                return Err(AnonymizeError::StagedSurplus {
                    column: slot.column.clone(),
                    remaining,
                });
            }
        }
        Ok(())
    }

    /// Drop everything staged by `steps`.
    pub fn discard(&mut self, steps: &[StepId]) {
        for step in steps {
            self.slots.remove(step);
        }
    }

    fn slot_mut(&mut self, step: StepId, column: &str) -> Result<&mut StagedSlot> {
        self.slots.get_mut(&step).ok_or_else(|| missing(column))
    }
}

fn underflow(slot: &StagedSlot) -> AnonymizeError {
    AnonymizeError::StagedUnderflow {
        column: slot.column.clone(),
        consumed: slot.consumed,
    }
}

fn missing(column: &str) -> AnonymizeError {
    AnonymizeError::rule(column, "staged", "prepare step did not run")
}

fn wrong_kind(column: &str, expected: &str, found: &Staged) -> AnonymizeError {
    let found = match found {
        Staged::Stack(_) => "stack",
        Staged::Pool(_) => "pool",
        Staged::Group(_) => "group",
        Staged::Scalar(_) => "scalar",
    };
    AnonymizeError::rule(
        column,
        "staged",
        format!("expected {expected} data, found {found}"),
    )
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn in_order_buffer_pops_in_read_order() {
        let mut buffer = StagedBuffer::in_order(ints(&[1, 2, 3]));
        assert_eq!(buffer.pop(), Some(Value::Int(1)));
        assert_eq!(buffer.pop(), Some(Value::Int(2)));
        assert_eq!(buffer.pop(), Some(Value::Int(3)));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn unshuffled_group_passes_tuples_through() {
        let columns = vec!["city".to_string(), "district".to_string()];
        let tuples = vec![
            vec![Value::from("Riga"), Value::Int(1)],
            vec![Value::from("Tallinn"), Value::Int(2)],
        ];
        let mut group = GroupBuffer::in_order(columns, tuples);

        let first = group.pop_tuple().expect("first tuple");
        assert_eq!(
            first,
            vec![
                ("city".to_string(), Value::from("Riga")),
                ("district".to_string(), Value::Int(1)),
            ]
        );
        let second = group.pop_tuple().expect("second tuple");
        assert_eq!(second[0].1, Value::from("Tallinn"));
        assert_eq!(second[1].1, Value::Int(2));
        assert!(group.pop_tuple().is_none());
    }

    #[test]
    fn shuffled_group_keeps_tuples_together() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let tuples: Vec<Vec<Value>> = (0..20)
            .map(|n| vec![Value::Int(n), Value::Int(n * 10)])
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut group = GroupBuffer::shuffled(columns, tuples, &mut rng);

        let mut seen = 0;
        while let Some(tuple) = group.pop_tuple() {
            let a = tuple[0].1.as_i64().expect("int");
            let b = tuple[1].1.as_i64().expect("int");
            assert_eq!(a * 10, b);
            seen += 1;
        }
        assert_eq!(seen, 20);
    }

    #[test]
    fn underflow_and_surplus_surface() {
        let step = StepId(0);
        let mut staged = StagedData::new();
        staged.insert(step, "email", Staged::Stack(StagedBuffer::in_order(ints(&[1, 2]))));

        assert!(matches!(
            staged.ensure_drained(&[step]),
            Err(AnonymizeError::StagedSurplus { remaining: 2, .. })
        ));
        staged.pop(step, "email").expect("first");
        staged.pop(step, "email").expect("second");
        staged.ensure_drained(&[step]).expect("drained");
        assert!(matches!(
            staged.pop(step, "email"),
            Err(AnonymizeError::StagedUnderflow { consumed: 2, .. })
        ));
    }
}
