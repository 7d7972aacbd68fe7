//! Stream connectors for the streamgate ingestion core
//!
//! This crate unifies six transport models — WebSocket push, SSE text push,
//! HTTP polling, Kafka consume, MQTT subscribe, and file tailing — behind one
//! connect/read/close contract, and provides the concurrent lifecycle manager
//! that pumps each connector's records into a registered callback. A
//! configuration-driven factory selects the concrete variant; a bounded
//! record buffer serves as the standard callback target.

pub mod buffer;
pub mod error;
pub mod factory;
pub mod file_tail;
pub mod http_poll;
pub mod kafka;
pub mod manager;
pub mod mqtt;
pub mod sse;
pub mod traits;
pub mod websocket;

pub use buffer::RecordBuffer;
pub use error::{ConnectorError, Result};
pub use factory::{create_connector, SourceType};
pub use file_tail::{FileTailConfig, FileTailConnector};
pub use http_poll::{HttpPollConfig, HttpPollConnector};
pub use kafka::{KafkaConnector, KafkaConsumerConfig};
pub use manager::{RecordCallback, StreamManager};
pub use mqtt::{MqttConfig, MqttConnector};
pub use sse::{SseConfig, SseConnector};
pub use traits::{ConnectorState, StreamConnector};
pub use websocket::{WebSocketConfig, WebSocketConnector};
