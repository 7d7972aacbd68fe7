//! Core types for the streamgate ingestion pipeline
//!
//! This crate provides the `Record` data model shared by the connector and
//! pipeline crates: one decoded structured event, carried as an opaque JSON
//! object with a timestamp.

pub mod errors;
pub mod record;

pub use errors::{RecordError, Result};
pub use record::{Record, ERROR_FIELD, TIMESTAMP_FIELD};
