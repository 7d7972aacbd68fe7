//! Error types for connectors and the stream manager
//!
//! `Connection` is transport-fatal at connect time; `Transport` is a
//! mid-stream failure that ends one read loop; `StreamEnded` is orderly
//! closure. Frame-level decode problems never surface here — connectors
//! recover from those locally.

use thiserror::Error;

/// Main connector error type
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Target unreachable or rejected at connect time
    #[error("connection failed: {0}")]
    Connection(String),

    /// Operation on a connector that has not connected
    #[error("connector is not connected")]
    NotConnected,

    /// Transport became unusable mid-stream
    #[error("transport failure: {0}")]
    Transport(String),

    /// Orderly end of the stream
    #[error("stream ended")]
    StreamEnded,

    /// Unknown source type or invalid connector configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Name already registered with the manager
    #[error("connector name already registered: {0}")]
    DuplicateConnector(String),

    /// I/O errors from file-backed transports
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol errors
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP transport errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Kafka client errors
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;
