//! Column rules as data.
//!
//! Each [`Rule`] describes one transformation attached to a column. Rules
//! that need table data before rows are transformed also carry a
//! [`PrepareScope`]; the rest act on the row value alone.

use std::fmt;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use datamask_core::{Row, Value};
use rand::RngCore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::faker::{FakeKind, ValueSource};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_MASK_CHAR: char = '*';
pub const DEFAULT_MASK_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// When a rule's staged data is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareScope {
    /// Once per table, before the first chunk.
    Table,
    /// Before every chunk, over that chunk's window.
    Chunk,
}

/// Calendar unit shifted by [`Rule::DateShift`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// One transformation attached to a column.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Set the column to a literal.
    Replace { value: Value },
    /// Set the column to a generated value.
    Fake { kind: FakeKind },
    /// Uniformly sample one of `values`.
    Sample { values: Vec<Value> },
    /// Pick `yes` with `probability`, else `no`.
    YesNo {
        yes: Value,
        no: Value,
        probability: f64,
    },
    /// Sample with replacement from the column's distinct values.
    ShuffleUnique {
        /// Restrict the distinct set to the current chunk.
        #[serde(default)]
        chunked: bool,
    },
    /// Permute the column's values across rows.
    ShuffleAll,
    /// Add a bounded random offset.
    #[serde(alias = "noise")]
    NumberVariance {
        amplitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distribution: Option<f64>,
    },
    /// Scale by `1 ± distortion` with `distortion` bounded by `percent` (a fraction).
    #[serde(alias = "relative_noise")]
    RelativeNumberVariance {
        percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distribution: Option<f64>,
    },
    /// Uniform random timestamp in `[start, end]`.
    DateInterval {
        start: String,
        end: String,
        #[serde(default = "default_date_format")]
        format: String,
    },
    /// Shift the existing date by a random amount of `unit`.
    DateShift {
        unit: DateUnit,
        amplitude: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distribution: Option<i64>,
        #[serde(default = "default_date_format")]
        format: String,
    },
    /// Move this column and `columns` together, one source row at a time.
    UniqueConstraints {
        columns: Vec<String>,
        #[serde(default = "default_true")]
        shuffle: bool,
    },
    /// Replace with the average over the table or chunk.
    Aggregate,
    /// Hide the characters under `mask_char` positions of `template`.
    Mask {
        template: String,
        #[serde(default = "default_mask_char")]
        mask_char: char,
    },
    /// Replace masked characters with random alphabet characters.
    RandomMask {
        #[serde(default = "default_alphabet")]
        alphabet: String,
        template: String,
        #[serde(default = "default_mask_char")]
        mask_char: char,
    },
    /// Caller-supplied per-row function.
    #[serde(skip)]
    #[schemars(skip)]
    Custom(CustomRule),
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_mask_char() -> char {
    DEFAULT_MASK_CHAR
}

fn default_alphabet() -> String {
    DEFAULT_MASK_ALPHABET.to_string()
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::Replace { .. } => "replace",
            Rule::Fake { .. } => "fake",
            Rule::Sample { .. } => "sample",
            Rule::YesNo { .. } => "yes_no",
            Rule::ShuffleUnique { .. } => "shuffle_unique",
            Rule::ShuffleAll => "shuffle_all",
            Rule::NumberVariance { .. } => "number_variance",
            Rule::RelativeNumberVariance { .. } => "relative_number_variance",
            Rule::DateInterval { .. } => "date_interval",
            Rule::DateShift { .. } => "date_shift",
            Rule::UniqueConstraints { .. } => "unique_constraints",
            Rule::Aggregate => "aggregate",
            Rule::Mask { .. } => "mask",
            Rule::RandomMask { .. } => "random_mask",
            Rule::Custom(custom) => custom.name(),
        }
    }

    pub fn prepare_scope(&self) -> Option<PrepareScope> {
        match self {
            Rule::ShuffleUnique { chunked: false } => Some(PrepareScope::Table),
            Rule::ShuffleUnique { chunked: true }
            | Rule::ShuffleAll
            | Rule::UniqueConstraints { .. }
            | Rule::Aggregate => Some(PrepareScope::Chunk),
            _ => None,
        }
    }

    /// Validate parameters and drop rules that cannot change anything.
    ///
    /// Returns `Ok(None)` for a no-op, and an error message for parameters
    /// that can never be applied.
    pub fn normalize(self) -> std::result::Result<Option<Rule>, String> {
        if let Some(value) = self.non_finite_parameter() {
            return Err(format!("{} parameter {value} is not finite", self.name()));
        }
        match self {
            Rule::Sample { values } if values.is_empty() => Ok(Some(Rule::Replace {
                value: Value::Text(String::new()),
            })),
            Rule::YesNo { probability, .. } if !(0.0..=1.0).contains(&probability) => Err(
                format!("probability {probability} is outside [0, 1]"),
            ),
            Rule::YesNo { probability, .. } if probability == 0.0 => Ok(None),
            Rule::NumberVariance { amplitude, .. } if amplitude.is_nan() || amplitude <= 0.0 => {
                Ok(None)
            }
            Rule::NumberVariance {
                amplitude,
                distribution,
            } => Ok(Some(Rule::NumberVariance {
                amplitude,
                distribution: distribution.filter(|value| *value > 0.0),
            })),
            Rule::RelativeNumberVariance {
                percent,
                distribution,
            } => {
                let percent = if (0.0..=1.0).contains(&percent) {
                    percent
                } else {
                    0.0
                };
                if percent == 0.0 {
                    return Ok(None);
                }
                Ok(Some(Rule::RelativeNumberVariance {
                    percent,
                    distribution: distribution.filter(|value| *value > 0.0),
                }))
            }
            Rule::DateInterval { start, end, format } => {
                check_format(&format)?;
                let from = parse_date(&start, &format)
                    .ok_or_else(|| format!("start '{start}' does not match '{format}'"))?;
                let to = parse_date(&end, &format)
                    .ok_or_else(|| format!("end '{end}' does not match '{format}'"))?;
                if from > to {
                    return Ok(None);
                }
                Ok(Some(Rule::DateInterval { start, end, format }))
            }
            Rule::DateShift { amplitude, .. } if amplitude <= 0 => Ok(None),
            Rule::DateShift {
                unit,
                amplitude,
                distribution,
                format,
            } => {
                check_format(&format)?;
                Ok(Some(Rule::DateShift {
                    unit,
                    amplitude,
                    distribution: distribution.filter(|value| *value > 0),
                    format,
                }))
            }
            Rule::UniqueConstraints { columns, .. } if columns.is_empty() => {
                Err("a constraint group needs at least one more column".to_string())
            }
            Rule::Mask { template, .. } if template.is_empty() => Ok(None),
            Rule::RandomMask { template, .. } if template.is_empty() => Ok(None),
            Rule::RandomMask { alphabet, .. } if alphabet.is_empty() => {
                Err("random mask alphabet is empty".to_string())
            }
            other => Ok(Some(other)),
        }
    }

    fn non_finite_parameter(&self) -> Option<f64> {
        let values = match self {
            Rule::YesNo { probability, .. } => vec![Some(*probability)],
            Rule::NumberVariance {
                amplitude,
                distribution,
            } => vec![Some(*amplitude), *distribution],
            Rule::RelativeNumberVariance {
                percent,
                distribution,
            } => vec![Some(*percent), *distribution],
            _ => Vec::new(),
        };
        values.into_iter().flatten().find(|value| !value.is_finite())
    }
}

/// Function signature of a [`CustomRule`].
pub type CustomFn = dyn Fn(&mut ColumnContext<'_>) -> Result<Value> + Send + Sync;

/// Named caller-supplied transformation.
#[derive(Clone)]
pub struct CustomRule {
    name: String,
    func: Arc<CustomFn>,
}

impl CustomRule {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut ColumnContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, ctx: &mut ColumnContext<'_>) -> Result<Value> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule").field("name", &self.name).finish()
    }
}

/// What a [`CustomRule`] sees for the value it replaces.
pub struct ColumnContext<'a> {
    pub column: &'a str,
    pub value: &'a Value,
    pub row: &'a Row,
    pub rng: &'a mut dyn RngCore,
    pub values: &'a dyn ValueSource,
}

impl ColumnContext<'_> {
    pub fn fake(&mut self, kind: FakeKind) -> Value {
        self.values.generate(kind, &mut *self.rng)
    }
}

/// Function signature of a row hook run after every column step.
pub type RowHookFn = dyn Fn(&mut Row) -> Result<()> + Send + Sync;

/// Named hook executed once per row after all column steps.
#[derive(Clone)]
pub struct RowHook {
    name: String,
    func: Arc<RowHookFn>,
}

impl RowHook {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Row) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, row: &mut Row) -> Result<()> {
        (self.func)(row)
    }
}

impl fmt::Debug for RowHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowHook").field("name", &self.name).finish()
    }
}

fn check_format(format: &str) -> std::result::Result<(), String> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("malformed date format '{format}'"));
    }
    Ok(())
}

/// Parse a timestamp, falling back to a date at midnight.
pub fn parse_date(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
