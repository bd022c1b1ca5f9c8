//! Online Aggregator — statistics over a record stream in O(1) memory
//!
//! Records are consumed one at a time; only the accumulator state is kept.
//! NULL 값은 SQL 집계와 같이 건너뜁니다. A non-numeric value fails the
//! aggregation with `TypeMismatch`.

use crate::connection::ConnectionPool;
use crate::error::{FlowError, FlowResult};
use crate::storage::{Record, ScalarValue};
use crate::stream::open_cursor_stream;
use tracing::debug;

/// Running statistic fed one non-null value at a time.
pub trait Accumulator {
    type Output;

    /// Feeds a numeric value.
    fn update(&mut self, value: f64);

    /// Feeds a raw field value. The default rejects non-numeric values.
    fn accept(&mut self, value: &ScalarValue) -> FlowResult<()> {
        let n = value.as_f64().ok_or_else(|| FlowError::TypeMismatch {
            expected: "INTEGER or FLOAT".to_string(),
            actual: value.type_name().to_string(),
        })?;
        self.update(n);
        Ok(())
    }

    fn finish(&self) -> Self::Output;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum {
    total: f64,
}

impl Accumulator for Sum {
    type Output = f64;

    fn update(&mut self, value: f64) {
        self.total += value;
    }

    fn finish(&self) -> f64 {
        self.total
    }
}

/// Counts non-null values of any type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count {
    n: u64,
}

impl Accumulator for Count {
    type Output = u64;

    fn update(&mut self, _value: f64) {
        self.n += 1;
    }

    fn accept(&mut self, _value: &ScalarValue) -> FlowResult<()> {
        self.n += 1;
        Ok(())
    }

    fn finish(&self) -> u64 {
        self.n
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Min {
    min: Option<f64>,
}

impl Accumulator for Min {
    type Output = Option<f64>;

    fn update(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
    }

    fn finish(&self) -> Option<f64> {
        self.min
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Max {
    max: Option<f64>,
}

impl Accumulator for Max {
    type Output = Option<f64>;

    fn update(&mut self, value: f64) {
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn finish(&self) -> Option<f64> {
        self.max
    }
}

/// Arithmetic mean from a running sum and count; `0.0` when nothing was fed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean {
    sum: f64,
    count: u64,
}

impl Accumulator for Mean {
    type Output = f64;

    fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn finish(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Folds `field` of every record in `stream` into `acc`.
///
/// Stops at the first stream error or type mismatch; the stream is dropped
/// (and its connection released) on return.
pub fn aggregate<I, A>(stream: I, field: &str, mut acc: A) -> FlowResult<A::Output>
where
    I: IntoIterator<Item = FlowResult<Record>>,
    A: Accumulator,
{
    let mut seen = 0usize;
    for record in stream {
        let record = record?;
        let value = record.get(field).ok_or_else(|| FlowError::ColumnNotFound {
            table: "result set".to_string(),
            column: field.to_string(),
        })?;
        if !value.is_null() {
            acc.accept(value)?;
        }
        seen += 1;
    }
    debug!(field, records = seen, "aggregation finished");
    Ok(acc.finish())
}

/// Mean of `field` over `query`, streamed row by row.
pub fn compute_mean(pool: &ConnectionPool, query: &str, field: &str) -> FlowResult<f64> {
    aggregate(open_cursor_stream(pool, query, Vec::new()), field, Mean::default())
}
