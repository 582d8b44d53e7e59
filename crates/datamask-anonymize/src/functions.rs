//! Transformation function library.
//!
//! Free constructors build [`Rule`] values; the [`Functions`] extension
//! trait appends them to the open column of any [`RuleBuilder`].

use datamask_core::{Row, Value};

use crate::anonymizer::RuleBuilder;
use crate::errors::Result;
use crate::faker::{FakeKind, ValueSource};
use crate::rules::{
    ColumnContext, CustomRule, DEFAULT_MASK_ALPHABET, DateUnit, Rule, RowHook,
};

pub fn replace(value: impl Into<Value>) -> Rule {
    Rule::Replace {
        value: value.into(),
    }
}

pub fn fake(kind: FakeKind) -> Rule {
    Rule::Fake { kind }
}

pub fn sample<I, V>(values: I) -> Rule
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Rule::Sample {
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn yes_no(yes: impl Into<Value>, no: impl Into<Value>, probability: f64) -> Rule {
    Rule::YesNo {
        yes: yes.into(),
        no: no.into(),
        probability,
    }
}

pub fn nullify(null: bool) -> Rule {
    if null {
        replace(Value::Null)
    } else {
        replace("")
    }
}

pub fn shuffle_unique(chunked: bool) -> Rule {
    Rule::ShuffleUnique { chunked }
}

pub fn shuffle_all() -> Rule {
    Rule::ShuffleAll
}

pub fn number_variance(amplitude: f64, distribution: Option<f64>) -> Rule {
    Rule::NumberVariance {
        amplitude,
        distribution,
    }
}

pub fn relative_number_variance(percent: f64, distribution: Option<f64>) -> Rule {
    Rule::RelativeNumberVariance {
        percent,
        distribution,
    }
}

pub fn date_interval(start: &str, end: &str, format: &str) -> Rule {
    Rule::DateInterval {
        start: start.to_string(),
        end: end.to_string(),
        format: format.to_string(),
    }
}

pub fn date_shift(unit: DateUnit, amplitude: i64, distribution: Option<i64>, format: &str) -> Rule {
    Rule::DateShift {
        unit,
        amplitude,
        distribution,
        format: format.to_string(),
    }
}

pub fn unique_constraints<I, S>(columns: I, shuffle: bool) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Rule::UniqueConstraints {
        columns: columns.into_iter().map(Into::into).collect(),
        shuffle,
    }
}

pub fn aggregate() -> Rule {
    Rule::Aggregate
}

pub fn mask(template: &str, mask_char: char) -> Rule {
    Rule::Mask {
        template: template.to_string(),
        mask_char,
    }
}

pub fn random_mask(alphabet: Option<&str>, template: &str, mask_char: char) -> Rule {
    Rule::RandomMask {
        alphabet: alphabet.unwrap_or(DEFAULT_MASK_ALPHABET).to_string(),
        template: template.to_string(),
        mask_char,
    }
}

pub fn custom<F>(name: &str, func: F) -> Rule
where
    F: Fn(&mut ColumnContext<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Rule::Custom(CustomRule::new(name, func))
}

/// Fluent rule methods for every [`RuleBuilder`].
pub trait Functions: RuleBuilder + Sized {
    /// Declare the column without transforming it.
    fn do_nothing(&mut self) -> &mut Self {
        self
    }

    fn replace_with(&mut self, value: impl Into<Value>) -> &mut Self {
        self.add_rule(replace(value))
    }

    fn replace_with_fake(&mut self, kind: FakeKind) -> &mut Self {
        self.add_rule(fake(kind))
    }

    /// Replace with the output of `generator`, which receives the value source.
    fn replace_with_generator<F>(&mut self, generator: F) -> &mut Self
    where
        F: Fn(&dyn ValueSource, &mut dyn rand::RngCore) -> Value + Send + Sync + 'static,
    {
        self.add_rule(custom("generator", move |ctx| {
            Ok(generator(ctx.values, &mut *ctx.rng))
        }))
    }

    fn replace_with_one_of<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_rule(sample(values))
    }

    fn replace_yes_no(
        &mut self,
        pair: (impl Into<Value>, impl Into<Value>),
        probability: f64,
    ) -> &mut Self {
        self.add_rule(yes_no(pair.0, pair.1, probability))
    }

    fn nullify(&mut self, null: bool) -> &mut Self {
        self.add_rule(nullify(null))
    }

    fn shuffle_unique(&mut self, chunked: bool) -> &mut Self {
        self.add_rule(shuffle_unique(chunked))
    }

    fn shuffle_all(&mut self) -> &mut Self {
        self.add_rule(shuffle_all())
    }

    fn number_variance(&mut self, amplitude: f64, distribution: Option<f64>) -> &mut Self {
        self.add_rule(number_variance(amplitude, distribution))
    }

    fn noise(&mut self, amplitude: f64) -> &mut Self {
        self.number_variance(amplitude, None)
    }

    fn relative_number_variance(&mut self, percent: f64, distribution: Option<f64>) -> &mut Self {
        self.add_rule(relative_number_variance(percent, distribution))
    }

    fn relative_noise(&mut self, percent: f64) -> &mut Self {
        self.relative_number_variance(percent, None)
    }

    fn date_time_from_interval(&mut self, start: &str, end: &str, format: &str) -> &mut Self {
        self.add_rule(date_interval(start, end, format))
    }

    fn date_time_modifier(
        &mut self,
        unit: DateUnit,
        amplitude: i64,
        distribution: Option<i64>,
        format: &str,
    ) -> &mut Self {
        self.add_rule(date_shift(unit, amplitude, distribution, format))
    }

    fn set_unique_constraints<I, S>(&mut self, columns: I, shuffle: bool) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_rule(unique_constraints(columns, shuffle))
    }

    fn chunked_aggregation(&mut self) -> &mut Self {
        self.add_rule(aggregate())
    }

    fn mask(&mut self, template: &str, mask_char: char) -> &mut Self {
        self.add_rule(mask(template, mask_char))
    }

    fn random_masking(&mut self, alphabet: Option<&str>, template: &str, mask_char: char) -> &mut Self {
        self.add_rule(random_mask(alphabet, template, mask_char))
    }

    fn transform_with<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&mut ColumnContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.add_rule(custom(name, func))
    }

    fn after_row_with<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&mut Row) -> Result<()> + Send + Sync + 'static,
    {
        self.after_row(RowHook::new(name, func))
    }
}

impl<T: RuleBuilder> Functions for T {}
