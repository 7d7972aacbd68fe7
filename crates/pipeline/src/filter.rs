//! Record filters
//!
//! Filters are predicate-shaped stages: an ordered record sequence in, a
//! subsequence out. They compose through [`CompositeFilter`] with AND/OR
//! semantics and plug into [`crate::StreamProcessor`].
//!
//! Field handling mirrors the tabular projection the batches are analyzed
//! under: a field absent from every record in the batch leaves the batch
//! unchanged, while records individually missing or failing the field test
//! are dropped.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;
use streamgate_types::Record;

use crate::error::{PipelineError, Result};

/// A predicate-shaped stage narrowing a record sequence.
///
/// `apply` must return a subsequence of its input: survivors keep their
/// relative order and no new records are introduced. [`CompositeFilter`]
/// relies on this contract to recover survivor positions for OR-composition.
pub trait DataFilter: Send + Sync {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>>;
}

/// Keeps records whose `timestamp` falls within `[start, end]`, or within
/// the last N minutes of now.
///
/// `last_minutes` takes precedence over the absolute bounds. Records whose
/// timestamp cannot be parsed are dropped, unless no record in the batch has
/// a parseable timestamp at all.
pub struct TimeRangeFilter {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    last_minutes: Option<i64>,
}

impl TimeRangeFilter {
    /// Absolute time window; either bound may be open.
    pub fn between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            last_minutes: None,
        }
    }

    /// Sliding window over the last `minutes` minutes of now.
    pub fn last_minutes(minutes: i64) -> Self {
        Self {
            start: None,
            end: None,
            last_minutes: Some(minutes),
        }
    }
}

impl DataFilter for TimeRangeFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        if !records.iter().any(|record| record.timestamp().is_some()) {
            return Ok(records.to_vec());
        }
        let cutoff = self
            .last_minutes
            .map(|minutes| Utc::now() - Duration::minutes(minutes));
        Ok(records
            .iter()
            .filter(|record| {
                let Some(stamp) = record.timestamp() else {
                    return false;
                };
                match cutoff {
                    Some(cutoff) => stamp >= cutoff,
                    None => {
                        self.start.map_or(true, |start| stamp >= start)
                            && self.end.map_or(true, |end| stamp <= end)
                    }
                }
            })
            .cloned()
            .collect())
    }
}

/// Keeps records whose named numeric field falls within `[min, max]`.
pub struct ValueRangeFilter {
    field: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl ValueRangeFilter {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }
}

impl DataFilter for ValueRangeFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        if !records.iter().any(|record| record.contains_key(&self.field)) {
            return Ok(records.to_vec());
        }
        Ok(records
            .iter()
            .filter(|record| {
                let Some(value) = record.number(&self.field) else {
                    return false;
                };
                self.min.map_or(true, |min| value >= min)
                    && self.max.map_or(true, |max| value <= max)
            })
            .cloned()
            .collect())
    }
}

/// Keeps (or, with `exclude`, drops) records whose named field's value is in
/// a given set.
pub struct CategoryFilter {
    field: String,
    categories: HashSet<String>,
    exclude: bool,
}

impl CategoryFilter {
    pub fn new<I, S>(field: impl Into<String>, categories: I, exclude: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            categories: categories.into_iter().map(Into::into).collect(),
            exclude,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        let key = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        self.categories.contains(&key)
    }
}

impl DataFilter for CategoryFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        if !records.iter().any(|record| record.contains_key(&self.field)) {
            return Ok(records.to_vec());
        }
        Ok(records
            .iter()
            .filter(|record| match record.get(&self.field) {
                Some(value) => self.matches(value) != self.exclude,
                // a record without the field never matches the set, which
                // keeps it under exclude semantics
                None => self.exclude,
            })
            .cloned()
            .collect())
    }
}

/// Keeps records whose named field's string rendition matches a regular
/// expression.
pub struct PatternFilter {
    field: String,
    regex: Regex,
}

impl PatternFilter {
    /// Compiles `pattern`; invalid expressions fail construction.
    pub fn new(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            field: field.into(),
            regex,
        })
    }
}

impl DataFilter for PatternFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        if !records.iter().any(|record| record.contains_key(&self.field)) {
            return Ok(records.to_vec());
        }
        Ok(records
            .iter()
            .filter(|record| {
                let Some(value) = record.get(&self.field) else {
                    return false;
                };
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                self.regex.is_match(&rendered)
            })
            .cloned()
            .collect())
    }
}

/// Wraps an arbitrary caller-supplied predicate.
pub struct CustomFilter {
    predicate: Box<dyn Fn(&Record) -> bool + Send + Sync>,
}

impl CustomFilter {
    pub fn new(predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl DataFilter for CustomFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        Ok(records
            .iter()
            .filter(|record| (self.predicate)(record))
            .cloned()
            .collect())
    }
}

/// Combinator for [`CompositeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
}

impl FromStr for CompositeOp {
    type Err = PipelineError;

    fn from_str(input: &str) -> Result<Self> {
        match input.to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(PipelineError::UnknownOperator(other.to_string())),
        }
    }
}

/// Combines a list of filters.
///
/// AND applies the filters sequentially, each narrowing the previous result.
/// OR keeps the union of input positions surviving any sub-filter — every
/// sub-filter sees the original sequence, not the others' outputs. An empty
/// AND is the identity; an empty OR keeps nothing.
pub struct CompositeFilter {
    filters: Vec<Box<dyn DataFilter>>,
    op: CompositeOp,
}

impl CompositeFilter {
    pub fn new(filters: Vec<Box<dyn DataFilter>>, op: CompositeOp) -> Self {
        Self { filters, op }
    }

    /// Builds from a textual operator ("AND"/"OR", case-insensitive);
    /// unknown operators fail loudly.
    pub fn with_operator(filters: Vec<Box<dyn DataFilter>>, operator: &str) -> Result<Self> {
        Ok(Self::new(filters, operator.parse()?))
    }
}

impl DataFilter for CompositeFilter {
    fn apply(&self, records: &[Record]) -> Result<Vec<Record>> {
        match self.op {
            CompositeOp::And => {
                let mut current = records.to_vec();
                for filter in &self.filters {
                    current = filter.apply(&current)?;
                }
                Ok(current)
            }
            CompositeOp::Or => {
                let mut keep = vec![false; records.len()];
                for filter in &self.filters {
                    let survivors = filter.apply(records)?;
                    for (position, survived) in
                        subsequence_mask(records, &survivors).into_iter().enumerate()
                    {
                        keep[position] |= survived;
                    }
                }
                Ok(records
                    .iter()
                    .zip(&keep)
                    .filter(|(_, kept)| **kept)
                    .map(|(record, _)| record.clone())
                    .collect())
            }
        }
    }
}

/// Marks which input positions survived, given that `survivors` is a
/// subsequence of `records` (the [`DataFilter`] contract).
fn subsequence_mask(records: &[Record], survivors: &[Record]) -> Vec<bool> {
    let mut mask = vec![false; records.len()];
    let mut cursor = 0;
    for survivor in survivors {
        while cursor < records.len() && &records[cursor] != survivor {
            cursor += 1;
        }
        if cursor == records.len() {
            break;
        }
        mask[cursor] = true;
        cursor += 1;
    }
    mask
}

/// Outlier filter calibrated on a reference batch: keeps records whose
/// z-score for `field` against the reference mean and standard deviation
/// exceeds `threshold`.
pub fn anomaly_filter(reference: &[Record], field: &str, threshold: f64) -> CustomFilter {
    let values: Vec<f64> = reference
        .iter()
        .filter_map(|record| record.number(field))
        .collect();
    let count = values.len();
    let mean = if count == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / count as f64
    };
    let std_dev = if count > 1 {
        let variance = values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };
    let field = field.to_string();
    CustomFilter::new(move |record| {
        if count == 0 {
            return false;
        }
        let Some(value) = record.number(&field) else {
            return false;
        };
        if std_dev == 0.0 {
            // degenerate reference: anything off the mean is infinitely far
            return value != mean;
        }
        ((value - mean) / std_dev).abs() > threshold
    })
}

/// Range filter with bounds at the reference batch's percentiles for `field`.
pub fn percentile_filter(
    reference: &[Record],
    field: &str,
    lower_percentile: f64,
    upper_percentile: f64,
) -> ValueRangeFilter {
    let mut values: Vec<f64> = reference
        .iter()
        .filter_map(|record| record.number(field))
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let lower = quantile(&values, lower_percentile / 100.0);
    let upper = quantile(&values, upper_percentile / 100.0);
    ValueRangeFilter::new(field, lower, upper)
}

/// Linearly interpolated quantile of a sorted sample.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return Some(sorted[low]);
    }
    let weight = rank - low as f64;
    Some(sorted[low] * (1.0 - weight) + sorted[high] * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_object(value.as_object().unwrap().clone())
    }

    fn numbers(records: &[Record], field: &str) -> Vec<f64> {
        records.iter().filter_map(|r| r.number(field)).collect()
    }

    #[test]
    fn value_range_keeps_in_bounds_records() {
        let records = vec![
            record(json!({"v": -1})),
            record(json!({"v": 5})),
            record(json!({"v": 20})),
        ];
        let filter = ValueRangeFilter::new("v", Some(0.0), Some(10.0));
        let kept = filter.apply(&records).unwrap();
        assert_eq!(numbers(&kept, "v"), vec![5.0]);
    }

    #[test]
    fn value_range_with_open_bounds() {
        let records = vec![record(json!({"v": -1})), record(json!({"v": 20}))];
        let no_min = ValueRangeFilter::new("v", None, Some(10.0));
        assert_eq!(numbers(&no_min.apply(&records).unwrap(), "v"), vec![-1.0]);
        let no_max = ValueRangeFilter::new("v", Some(0.0), None);
        assert_eq!(numbers(&no_max.apply(&records).unwrap(), "v"), vec![20.0]);
    }

    #[test]
    fn value_range_leaves_batch_unchanged_when_field_absent() {
        let records = vec![record(json!({"w": 1})), record(json!({"w": 2}))];
        let filter = ValueRangeFilter::new("v", Some(0.0), Some(10.0));
        assert_eq!(filter.apply(&records).unwrap(), records);
    }

    #[test]
    fn value_range_drops_records_missing_a_present_field() {
        let records = vec![record(json!({"v": 5})), record(json!({"w": 5}))];
        let filter = ValueRangeFilter::new("v", Some(0.0), Some(10.0));
        assert_eq!(filter.apply(&records).unwrap().len(), 1);
    }

    #[test]
    fn time_range_last_minutes_drops_stale_records() {
        let stale = (Utc::now() - Duration::minutes(30)).to_rfc3339();
        let records = vec![
            record(json!({"timestamp": stale, "v": 1})),
            record(json!({"timestamp": stale, "v": 2})),
        ];
        let filter = TimeRangeFilter::last_minutes(5);
        assert!(filter.apply(&records).unwrap().is_empty());
    }

    #[test]
    fn time_range_last_minutes_keeps_fresh_records() {
        let fresh = Utc::now().to_rfc3339();
        let stale = (Utc::now() - Duration::minutes(30)).to_rfc3339();
        let records = vec![
            record(json!({"timestamp": fresh, "v": 1})),
            record(json!({"timestamp": stale, "v": 2})),
        ];
        let kept = TimeRangeFilter::last_minutes(5).apply(&records).unwrap();
        assert_eq!(numbers(&kept, "v"), vec![1.0]);
    }

    #[test]
    fn time_range_between_respects_bounds() {
        let records = vec![
            record(json!({"timestamp": "2024-05-01T10:00:00Z", "v": 1})),
            record(json!({"timestamp": "2024-05-01T12:00:00Z", "v": 2})),
            record(json!({"timestamp": "2024-05-01T14:00:00Z", "v": 3})),
        ];
        let start = "2024-05-01T11:00:00Z".parse().unwrap();
        let end = "2024-05-01T13:00:00Z".parse().unwrap();
        let kept = TimeRangeFilter::between(Some(start), Some(end))
            .apply(&records)
            .unwrap();
        assert_eq!(numbers(&kept, "v"), vec![2.0]);
    }

    #[test]
    fn time_range_without_timestamps_is_identity() {
        let records = vec![record(json!({"v": 1}))];
        let kept = TimeRangeFilter::last_minutes(5).apply(&records).unwrap();
        assert_eq!(kept, records);
    }

    #[test]
    fn category_filter_includes_and_excludes() {
        let records = vec![
            record(json!({"kind": "sensor"})),
            record(json!({"kind": "audit"})),
            record(json!({"other": true})),
        ];
        let include = CategoryFilter::new("kind", ["sensor"], false);
        let kept = include.apply(&records).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].get("kind"), Some(&json!("sensor")));

        // exclude keeps the field-less record too
        let exclude = CategoryFilter::new("kind", ["sensor"], true);
        assert_eq!(exclude.apply(&records).unwrap().len(), 2);
    }

    #[test]
    fn category_filter_matches_non_string_values() {
        let records = vec![record(json!({"code": 404})), record(json!({"code": 200}))];
        let filter = CategoryFilter::new("code", ["404"], false);
        assert_eq!(filter.apply(&records).unwrap().len(), 1);
    }

    #[test]
    fn pattern_filter_matches_substrings() {
        let records = vec![
            record(json!({"msg": "connection refused"})),
            record(json!({"msg": "all good"})),
        ];
        let filter = PatternFilter::new("msg", r"refused|reset").unwrap();
        let kept = filter.apply(&records).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn pattern_filter_rejects_bad_regex() {
        let err = PatternFilter::new("msg", "([unclosed").err().unwrap();
        assert!(matches!(err, PipelineError::InvalidPattern { .. }));
    }

    #[test]
    fn custom_filter_applies_predicate() {
        let records = vec![record(json!({"v": 1})), record(json!({"v": 2}))];
        let filter = CustomFilter::new(|r| r.number("v") == Some(2.0));
        assert_eq!(filter.apply(&records).unwrap().len(), 1);
    }

    #[test]
    fn empty_and_composite_is_identity() {
        let records = vec![record(json!({"v": 1})), record(json!({"v": 2}))];
        let filter = CompositeFilter::new(vec![], CompositeOp::And);
        assert_eq!(filter.apply(&records).unwrap(), records);
    }

    #[test]
    fn empty_or_composite_keeps_nothing() {
        let records = vec![record(json!({"v": 1})), record(json!({"v": 2}))];
        let filter = CompositeFilter::new(vec![], CompositeOp::Or);
        assert!(filter.apply(&records).unwrap().is_empty());
    }

    #[test]
    fn and_composite_narrows_monotonically() {
        let records: Vec<Record> = (0..10).map(|v| record(json!({"v": v}))).collect();
        let low: Box<dyn DataFilter> = Box::new(ValueRangeFilter::new("v", Some(2.0), None));
        let high: Box<dyn DataFilter> = Box::new(ValueRangeFilter::new("v", None, Some(6.0)));
        let composed = CompositeFilter::new(vec![low, high], CompositeOp::And);
        let kept = composed.apply(&records).unwrap();
        assert_eq!(numbers(&kept, "v"), vec![2.0, 3.0, 4.0, 5.0, 6.0]);

        // result is a subsequence of each individual filter's result
        for bounds in [(Some(2.0), None), (None, Some(6.0))] {
            let single = ValueRangeFilter::new("v", bounds.0, bounds.1)
                .apply(&records)
                .unwrap();
            assert!(kept.iter().all(|r| single.contains(r)));
        }
    }

    #[test]
    fn or_composite_unions_survivors_in_input_order() {
        let records: Vec<Record> = (0..6).map(|v| record(json!({"v": v}))).collect();
        let low: Box<dyn DataFilter> = Box::new(ValueRangeFilter::new("v", None, Some(1.0)));
        let high: Box<dyn DataFilter> = Box::new(ValueRangeFilter::new("v", Some(4.0), None));
        let composed = CompositeFilter::new(vec![low, high], CompositeOp::Or);
        let kept = composed.apply(&records).unwrap();
        assert_eq!(numbers(&kept, "v"), vec![0.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn or_composite_result_covers_each_filter() {
        let records: Vec<Record> = (0..6).map(|v| record(json!({"v": v}))).collect();
        let filters: Vec<(Option<f64>, Option<f64>)> =
            vec![(None, Some(2.0)), (Some(3.0), Some(4.0))];
        let boxed: Vec<Box<dyn DataFilter>> = filters
            .iter()
            .map(|(min, max)| {
                Box::new(ValueRangeFilter::new("v", *min, *max)) as Box<dyn DataFilter>
            })
            .collect();
        let kept = CompositeFilter::new(boxed, CompositeOp::Or)
            .apply(&records)
            .unwrap();
        for (min, max) in filters {
            let single = ValueRangeFilter::new("v", min, max).apply(&records).unwrap();
            assert!(single.iter().all(|r| kept.contains(r)));
        }
    }

    #[test]
    fn composite_operator_parses_case_insensitively() {
        assert_eq!("and".parse::<CompositeOp>().unwrap(), CompositeOp::And);
        assert_eq!("OR".parse::<CompositeOp>().unwrap(), CompositeOp::Or);
        let err = "XOR".parse::<CompositeOp>().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownOperator(_)));
    }

    #[test]
    fn composite_with_operator_rejects_unknown_combinators() {
        assert!(CompositeFilter::with_operator(vec![], "NAND").is_err());
    }

    #[test]
    fn subsequence_mask_handles_duplicates() {
        let records = vec![
            record(json!({"v": 1})),
            record(json!({"v": 1})),
            record(json!({"v": 2})),
        ];
        let survivors = vec![record(json!({"v": 1})), record(json!({"v": 2}))];
        assert_eq!(
            subsequence_mask(&records, &survivors),
            vec![true, false, true]
        );
    }

    #[test]
    fn anomaly_filter_keeps_outliers() {
        let mut reference: Vec<Record> = (0..20).map(|_| record(json!({"v": 10.0}))).collect();
        reference.push(record(json!({"v": 10.5})));
        let filter = anomaly_filter(&reference, "v", 3.0);
        let candidates = vec![record(json!({"v": 10.1})), record(json!({"v": 100.0}))];
        let kept = filter.apply(&candidates).unwrap();
        assert_eq!(numbers(&kept, "v"), vec![100.0]);
    }

    #[test]
    fn anomaly_filter_with_empty_reference_keeps_nothing() {
        let filter = anomaly_filter(&[], "v", 3.0);
        let candidates = vec![record(json!({"v": 1.0}))];
        assert!(filter.apply(&candidates).unwrap().is_empty());
    }

    #[test]
    fn percentile_filter_trims_tails() {
        let reference: Vec<Record> = (0..=100).map(|v| record(json!({"v": v}))).collect();
        let filter = percentile_filter(&reference, "v", 5.0, 95.0);
        let kept = filter.apply(&reference).unwrap();
        let values = numbers(&kept, "v");
        assert_eq!(values.first(), Some(&5.0));
        assert_eq!(values.last(), Some(&95.0));
    }
}
