//! Filter and transform pipeline for streamgate records
//!
//! This crate provides the declarative stages applied to buffered record
//! batches between ingestion and presentation: predicate-shaped filters,
//! reshaping transformers, and the [`StreamProcessor`] that runs registered
//! filters then transformers in order.

pub mod error;
pub mod filter;
pub mod processor;
pub mod transform;

pub use error::{PipelineError, Result as PipelineResult};
pub use filter::{
    anomaly_filter, percentile_filter, CategoryFilter, CompositeFilter, CompositeOp, CustomFilter,
    DataFilter, PatternFilter, TimeRangeFilter, ValueRangeFilter,
};
pub use processor::StreamProcessor;
pub use transform::{
    CustomTransformer, FlattenTransformer, Reducer, TimeAggregateTransformer, Transformer,
};
