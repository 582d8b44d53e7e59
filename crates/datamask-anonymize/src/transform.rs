//! Value-level transformations applied by per-row steps.
//!
//! Errors are plain messages; the row engine attaches the column and rule.

use chrono::{DateTime, Duration, Months, NaiveDateTime};
use datamask_core::Value;
use rand::Rng;

use crate::helpers::distributed_random;
use crate::rules::{DateUnit, parse_date};

type Outcome = std::result::Result<Value, String>;

fn numeric(value: &Value) -> std::result::Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("{} value '{value}' is not numeric", value.kind()))
}

/// Write `result` back with the numeric kind of `original`.
pub fn same_numeric_kind(original: &Value, result: f64) -> Value {
    let integral = match original {
        Value::Int(_) => true,
        Value::Text(text) => text.trim().parse::<i64>().is_ok(),
        _ => false,
    };
    if integral {
        Value::Int(result.round() as i64)
    } else {
        Value::Float(result)
    }
}

pub fn number_variance<R: Rng + ?Sized>(
    value: &Value,
    amplitude: f64,
    distribution: Option<f64>,
    rng: &mut R,
) -> Outcome {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let number = numeric(value)?;
    let offset = distributed_random(rng, amplitude, distribution);
    Ok(same_numeric_kind(value, number + offset))
}

pub fn relative_number_variance<R: Rng + ?Sized>(
    value: &Value,
    percent: f64,
    distribution: Option<f64>,
    rng: &mut R,
) -> Outcome {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let number = numeric(value)?;
    let distortion = distributed_random(rng, percent, distribution);
    Ok(same_numeric_kind(value, number * (1.0 + distortion)))
}

pub fn date_interval<R: Rng + ?Sized>(start: &str, end: &str, format: &str, rng: &mut R) -> Outcome {
    let from = parse_date(start, format)
        .ok_or_else(|| format!("start '{start}' does not match '{format}'"))?;
    let to = parse_date(end, format).ok_or_else(|| format!("end '{end}' does not match '{format}'"))?;
    let seconds = rng.random_range(from.and_utc().timestamp()..=to.and_utc().timestamp());
    let picked = DateTime::from_timestamp(seconds, 0)
        .map(|picked| picked.naive_utc())
        .ok_or_else(|| format!("timestamp {seconds} is out of range"))?;
    Ok(Value::Text(picked.format(format).to_string()))
}

pub fn date_shift<R: Rng + ?Sized>(
    value: &Value,
    unit: DateUnit,
    amplitude: i64,
    distribution: Option<i64>,
    format: &str,
    rng: &mut R,
) -> Outcome {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::Text(text) => text,
        other => return Err(format!("{} value '{other}' is not a date", other.kind())),
    };
    let date = parse_date(text, format)
        .ok_or_else(|| format!("value '{text}' does not match '{format}'"))?;
    let amount = distributed_random(rng, amplitude as f64, distribution.map(|d| d as f64)).round()
        as i64;
    let shifted = shift(date, unit, amount)
        .ok_or_else(|| format!("shifting '{text}' by {amount} {unit:?} overflows"))?;
    Ok(Value::Text(shifted.format(format).to_string()))
}

fn shift(date: NaiveDateTime, unit: DateUnit, amount: i64) -> Option<NaiveDateTime> {
    let duration = match unit {
        DateUnit::Second => Duration::try_seconds(amount),
        DateUnit::Minute => Duration::try_minutes(amount),
        DateUnit::Hour => Duration::try_hours(amount),
        DateUnit::Day => Duration::try_days(amount),
        DateUnit::Week => Duration::try_weeks(amount),
        DateUnit::Month => return shift_months(date, amount),
        DateUnit::Year => return shift_months(date, amount.checked_mul(12)?),
    };
    date.checked_add_signed(duration?)
}

fn shift_months(date: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// Positions where `template` holds `mask_char` become `mask_char`; all
/// other characters, including those past the template, are kept.
pub fn mask(value: &Value, template: &str, mask_char: char) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let masked = value
        .to_string()
        .chars()
        .zip(padded(template))
        .map(|(original, slot)| if slot == Some(mask_char) { mask_char } else { original })
        .collect();
    Value::Text(masked)
}

/// Like [`mask`], but masked positions get a random `alphabet` character
/// carrying the original character's case.
pub fn random_mask<R: Rng + ?Sized>(
    value: &Value,
    alphabet: &str,
    template: &str,
    mask_char: char,
    rng: &mut R,
) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let alphabet: Vec<char> = alphabet.chars().collect();
    let masked = value
        .to_string()
        .chars()
        .zip(padded(template))
        .map(|(original, slot)| {
            if slot != Some(mask_char) || alphabet.is_empty() {
                return original;
            }
            let replacement = alphabet[rng.random_range(0..alphabet.len())];
            if original.is_uppercase() {
                replacement.to_uppercase().next().unwrap_or(replacement)
            } else if original.is_lowercase() {
                replacement.to_lowercase().next().unwrap_or(replacement)
            } else {
                replacement
            }
        })
        .collect();
    Value::Text(masked)
}

fn padded(template: &str) -> impl Iterator<Item = Option<char>> + '_ {
    template.chars().map(Some).chain(std::iter::repeat(None))
}
