//! Error types for pipeline stages
//!
//! Filters and transformers are defensive about missing fields but fail
//! loudly on structurally invalid pipeline configuration.

use thiserror::Error;

/// Main pipeline error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Composite operator string was neither AND nor OR
    #[error("unknown composite operator: {0}")]
    UnknownOperator(String),

    /// Pattern filter received an invalid regular expression
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Aggregation interval must be positive
    #[error("invalid aggregation interval: {0}ms, must be greater than 0")]
    InvalidInterval(i64),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
