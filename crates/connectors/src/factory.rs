//! Connector factory
//!
//! Maps a source-type tag plus a JSON configuration mapping to a concrete
//! connector. Construction performs no I/O — transports are established by
//! `connect()`.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConnectorError, Result};
use crate::file_tail::{FileTailConfig, FileTailConnector};
use crate::http_poll::{HttpPollConfig, HttpPollConnector};
use crate::kafka::{KafkaConnector, KafkaConsumerConfig};
use crate::mqtt::{MqttConfig, MqttConnector};
use crate::sse::{SseConfig, SseConnector};
use crate::traits::StreamConnector;
use crate::websocket::{WebSocketConfig, WebSocketConnector};

/// Source-type tag selecting a connector variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Websocket,
    Sse,
    Http,
    Kafka,
    Mqtt,
    File,
}

impl SourceType {
    /// Tag name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Sse => "sse",
            Self::Http => "http",
            Self::Kafka => "kafka",
            Self::Mqtt => "mqtt",
            Self::File => "file",
        }
    }
}

impl FromStr for SourceType {
    type Err = ConnectorError;

    fn from_str(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "websocket" => Ok(Self::Websocket),
            "sse" => Ok(Self::Sse),
            "http" => Ok(Self::Http),
            "kafka" => Ok(Self::Kafka),
            "mqtt" => Ok(Self::Mqtt),
            "file" => Ok(Self::File),
            other => Err(ConnectorError::Configuration(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

fn parse_config<T: DeserializeOwned>(tag: SourceType, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| {
        ConnectorError::Configuration(format!("invalid {} connector config: {e}", tag.name()))
    })
}

/// Builds a connector from a source-type tag and a JSON configuration
/// mapping.
pub fn create_connector(source_type: &str, params: Value) -> Result<Box<dyn StreamConnector>> {
    let tag: SourceType = source_type.parse()?;
    let connector: Box<dyn StreamConnector> = match tag {
        SourceType::Websocket => Box::new(WebSocketConnector::new(parse_config::<WebSocketConfig>(
            tag, params,
        )?)),
        SourceType::Sse => Box::new(SseConnector::new(parse_config::<SseConfig>(tag, params)?)),
        SourceType::Http => Box::new(HttpPollConnector::new(parse_config::<HttpPollConfig>(
            tag, params,
        )?)),
        SourceType::Kafka => Box::new(KafkaConnector::new(parse_config::<KafkaConsumerConfig>(
            tag, params,
        )?)),
        SourceType::Mqtt => Box::new(MqttConnector::new(parse_config::<MqttConfig>(tag, params)?)),
        SourceType::File => Box::new(FileTailConnector::new(parse_config::<FileTailConfig>(
            tag, params,
        )?)),
    };
    Ok(connector)
}
