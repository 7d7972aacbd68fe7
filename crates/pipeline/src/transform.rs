//! Record transformers
//!
//! Transformers reshape a record sequence without necessarily narrowing it:
//! flattening nested objects, bucketing by time interval, or applying a
//! caller-supplied batch function.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use streamgate_types::{Record, TIMESTAMP_FIELD};

use crate::error::{PipelineError, Result};

/// A stage reshaping a record sequence.
pub trait Transformer: Send + Sync {
    fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>>;
}

/// Flattens nested objects into single-level records, joining keys with a
/// separator.
pub struct FlattenTransformer {
    separator: String,
}

impl FlattenTransformer {
    pub fn new() -> Self {
        Self::with_separator("_")
    }

    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for FlattenTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for FlattenTransformer {
    fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        Ok(records
            .into_iter()
            .map(|record| record.flatten(&self.separator))
            .collect())
    }
}

/// Reducers available to time-bucket aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Min,
    Max,
    Count,
}

impl Reducer {
    /// Default reducer set applied to every numeric field.
    pub const DEFAULT: [Reducer; 4] = [Reducer::Mean, Reducer::Min, Reducer::Max, Reducer::Count];

    /// Suffix used in output keys (`<field>_<name>`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    fn reduce(&self, values: &[f64]) -> Value {
        match self {
            Self::Mean => {
                float_value(values.iter().sum::<f64>() / values.len() as f64)
            }
            Self::Min => float_value(values.iter().fold(f64::INFINITY, |a, b| a.min(*b))),
            Self::Max => float_value(values.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b))),
            Self::Count => Value::Number(Number::from(values.len() as u64)),
        }
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Buckets records by a fixed `timestamp` interval and reduces their numeric
/// fields.
///
/// By default every numeric field in a bucket gets mean/min/max/count;
/// callers can pin reducers per field instead, in which case only those
/// fields appear. Each bucket yields one record stamped with the bucket
/// start, in chronological order. Records without a parseable timestamp are
/// dropped.
pub struct TimeAggregateTransformer {
    interval: Duration,
    reducers: Option<HashMap<String, Vec<Reducer>>>,
}

impl TimeAggregateTransformer {
    /// Fails on non-positive intervals.
    pub fn new(interval: Duration) -> Result<Self> {
        if interval <= Duration::zero() {
            return Err(PipelineError::InvalidInterval(interval.num_milliseconds()));
        }
        Ok(Self {
            interval,
            reducers: None,
        })
    }

    /// Restricts aggregation to the given fields with the given reducers.
    pub fn with_reducers(mut self, reducers: HashMap<String, Vec<Reducer>>) -> Self {
        self.reducers = Some(reducers);
        self
    }

    fn bucket_millis(&self, stamp: DateTime<Utc>) -> i64 {
        let interval = self.interval.num_milliseconds();
        stamp.timestamp_millis().div_euclid(interval) * interval
    }
}

impl Transformer for TimeAggregateTransformer {
    fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut buckets: BTreeMap<i64, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
        for record in &records {
            let Some(stamp) = record.timestamp() else {
                continue;
            };
            let fields = buckets.entry(self.bucket_millis(stamp)).or_default();
            for (key, value) in record.iter() {
                if key == TIMESTAMP_FIELD {
                    continue;
                }
                if let Some(number) = value.as_f64() {
                    fields.entry(key.clone()).or_default().push(number);
                }
            }
        }

        let mut out = Vec::with_capacity(buckets.len());
        for (bucket, fields) in buckets {
            let mut object = Map::new();
            if let Some(start) = Utc.timestamp_millis_opt(bucket).single() {
                object.insert(
                    TIMESTAMP_FIELD.to_string(),
                    Value::String(start.to_rfc3339()),
                );
            }
            for (field, values) in fields {
                let reducers: Vec<Reducer> = match &self.reducers {
                    Some(pinned) => match pinned.get(&field) {
                        Some(reducers) => reducers.clone(),
                        None => continue,
                    },
                    None => Reducer::DEFAULT.to_vec(),
                };
                for reducer in reducers {
                    object.insert(
                        format!("{field}_{}", reducer.name()),
                        reducer.reduce(&values),
                    );
                }
            }
            out.push(Record::from_object(object));
        }
        Ok(out)
    }
}

/// Wraps an arbitrary caller-supplied batch transformation.
pub struct CustomTransformer {
    func: Box<dyn Fn(Vec<Record>) -> Vec<Record> + Send + Sync>,
}

impl CustomTransformer {
    pub fn new(func: impl Fn(Vec<Record>) -> Vec<Record> + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }
}

impl Transformer for CustomTransformer {
    fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        Ok((self.func)(records))
    }
}
