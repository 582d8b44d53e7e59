//! Prepare steps: read table data and stage it for per-row consumption.

use datamask_core::{DataStore, Row, SelectQuery, Value, Window};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::errors::Result;
use crate::registry::{Registry, Step, StepId};
use crate::rules::Rule;
use crate::staged::{GroupBuffer, Staged, StagedBuffer, StagedData};

/// Where a prepare step reads from.
pub struct PrepareContext<'a> {
    pub source: &'a dyn DataStore,
    pub table: &'a str,
    /// Read order; the same order the row fetch uses.
    pub order_by: &'a [String],
    /// Current chunk window; `None` covers the whole table.
    pub window: Option<Window>,
}

impl PrepareContext<'_> {
    fn query<I, S>(&self, columns: I, window: Option<Window>) -> SelectQuery
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectQuery::table(self.table)
            .columns(columns)
            .order_by(self.order_by)
            .window(window)
    }
}

/// Run `steps` in order, replacing whatever they staged before.
pub async fn run_prepare_steps(
    ctx: &PrepareContext<'_>,
    steps: &[StepId],
    registry: &Registry,
    staged: &mut StagedData,
    rng: &mut ChaCha8Rng,
) -> Result<()> {
    for id in steps {
        let Some(step) = registry.step(*id) else {
            continue;
        };
        let data = prepare_step(ctx, step, rng).await?;
        if let Some(data) = data {
            staged.insert(step.id, &step.column, data);
        }
    }
    Ok(())
}

async fn prepare_step(
    ctx: &PrepareContext<'_>,
    step: &Step,
    rng: &mut ChaCha8Rng,
) -> Result<Option<Staged>> {
    let column = step.column.as_str();
    let staged = match &step.rule {
        Rule::ShuffleUnique { chunked } => {
            let window = if *chunked { ctx.window } else { None };
            let query = ctx.query([column], window).distinct();
            let values = column_values(ctx.source.select(&query).await?, column);
            debug!(table = ctx.table, column, distinct = values.len(), "staged distinct values");
            Staged::Pool(values)
        }
        Rule::ShuffleAll => {
            let query = ctx.query([column], ctx.window);
            let values = column_values(ctx.source.select(&query).await?, column);
            debug!(table = ctx.table, column, values = values.len(), "staged shuffled values");
            Staged::Stack(StagedBuffer::shuffled(values, rng))
        }
        Rule::UniqueConstraints { shuffle, .. } => {
            let columns = step.written_columns();
            let query = ctx.query(columns.iter().cloned(), ctx.window);
            let tuples: Vec<Vec<Value>> = ctx
                .source
                .select(&query)
                .await?
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            debug!(
                table = ctx.table,
                anchor = column,
                tuples = tuples.len(),
                shuffle,
                "staged constraint group"
            );
            if *shuffle {
                Staged::Group(GroupBuffer::shuffled(columns, tuples, rng))
            } else {
                Staged::Group(GroupBuffer::in_order(columns, tuples))
            }
        }
        Rule::Aggregate => {
            let query = ctx.query([column], ctx.window);
            let average = ctx.source.average(&query).await?;
            Staged::Scalar(average.map(Value::Float).unwrap_or(Value::Null))
        }
        _ => return Ok(None),
    };
    Ok(Some(staged))
}

fn column_values(rows: Vec<Row>, column: &str) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| row.remove(column).unwrap_or(Value::Null))
        .collect()
}
