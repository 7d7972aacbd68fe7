//! Filters and reshapes a small record batch through a processor pipeline.

use pipeline::{FlattenTransformer, StreamProcessor, ValueRangeFilter};
use serde_json::json;
use streamgate_types::Record;

fn main() -> anyhow::Result<()> {
    let records: Vec<Record> = [
        json!({"site": {"name": "alpha"}, "temperature": 21.5}),
        json!({"site": {"name": "beta"}, "temperature": -40.0}),
        json!({"site": {"name": "gamma"}, "temperature": 35.0}),
    ]
    .into_iter()
    .map(Record::from_value)
    .collect::<Result<_, _>>()?;

    let mut processor = StreamProcessor::new();
    processor
        .add_filter(ValueRangeFilter::new("temperature", Some(0.0), Some(40.0)))
        .add_transformer(FlattenTransformer::new());

    for record in processor.process(&records)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
