//! The filter-then-transform pipeline

use streamgate_types::Record;

use crate::error::Result;
use crate::filter::DataFilter;
use crate::transform::Transformer;

/// Ordered filters followed by ordered transformers over a record batch.
///
/// Registered filters apply in registration order (AND semantics across the
/// list), then transformers in registration order. The processor keeps no
/// state between invocations; an empty pipeline is the identity function.
#[derive(Default)]
pub struct StreamProcessor {
    filters: Vec<Box<dyn DataFilter>>,
    transformers: Vec<Box<dyn Transformer>>,
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter stage.
    pub fn add_filter<F: DataFilter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Appends a transformer stage.
    pub fn add_transformer<T: Transformer + 'static>(&mut self, transformer: T) -> &mut Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Runs the batch through every registered stage.
    pub fn process(&self, records: &[Record]) -> Result<Vec<Record>> {
        let mut current = records.to_vec();
        for filter in &self.filters {
            current = filter.apply(&current)?;
        }
        for transformer in &self.transformers {
            current = transformer.apply(current)?;
        }
        Ok(current)
    }

    /// Clears every registered stage; the processor becomes the identity.
    pub fn reset(&mut self) {
        self.filters.clear();
        self.transformers.clear();
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.filters.len() + self.transformers.len()
    }

    /// Whether no stages are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.transformers.is_empty()
    }
}
