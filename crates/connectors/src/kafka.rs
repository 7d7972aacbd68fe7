//! Kafka broker-consume connector

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::Message;
use serde::Deserialize;
use tracing::{debug, info, warn};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

/// How long each blocking poll waits before yielding back to the scheduler.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Kafka consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConsumerConfig {
    /// Brokers, comma-separated
    pub brokers: String,
    /// Topic to subscribe to
    pub topic: String,
    /// Consumer group ID
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Where to start when the group has no committed offset
    #[serde(default = "default_offset_reset")]
    pub auto_offset_reset: String,
}

fn default_group_id() -> String {
    "streamgate-consumer".to_string()
}

fn default_offset_reset() -> String {
    "latest".to_string()
}

/// Pub/sub group subscription over a blocking consumer.
///
/// The rdkafka poll is synchronous, so each `read()` runs it on the blocking
/// pool with a short timeout; the await between polls keeps the task
/// cancellable and never stalls the cooperative scheduler. Undecodable
/// payloads are logged and skipped.
pub struct KafkaConnector {
    config: KafkaConsumerConfig,
    consumer: Option<Arc<BaseConsumer>>,
    state: ConnectorState,
}

impl KafkaConnector {
    pub fn new(config: KafkaConsumerConfig) -> Self {
        Self {
            config,
            consumer: None,
            state: ConnectorState::Created,
        }
    }
}

#[async_trait]
impl StreamConnector for KafkaConnector {
    async fn connect(&mut self) -> Result<()> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| {
                ConnectorError::Connection(format!(
                    "kafka consumer for {} failed: {e}",
                    self.config.brokers
                ))
            })?;
        consumer.subscribe(&[self.config.topic.as_str()])?;
        info!(
            topic = %self.config.topic,
            group = %self.config.group_id,
            brokers = %self.config.brokers,
            "subscribed to kafka topic"
        );
        self.consumer = Some(Arc::new(consumer));
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        let consumer = self.consumer.clone().ok_or(ConnectorError::NotConnected)?;
        self.state = ConnectorState::Reading;
        loop {
            let consumer = Arc::clone(&consumer);
            // BorrowedMessage borrows the consumer, so payload extraction
            // stays inside the blocking closure
            let polled = tokio::task::spawn_blocking(move || {
                match consumer.poll(POLL_TIMEOUT) {
                    None => Ok(None),
                    Some(Ok(message)) => Ok(Some(message.payload().map(<[u8]>::to_vec))),
                    Some(Err(e)) => Err(e),
                }
            })
            .await
            .map_err(|e| ConnectorError::Transport(format!("kafka poll task failed: {e}")))?;

            match polled? {
                None => continue,
                Some(None) => debug!("kafka message without payload, skipping"),
                Some(Some(payload)) => match Record::parse_slice(&payload) {
                    Ok(record) => return Ok(record),
                    Err(e) => warn!(error = %e, "undecodable kafka payload, skipping"),
                },
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            info!(topic = %self.config.topic, "kafka consumer closed");
        }
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults() {
        let config: KafkaConsumerConfig = serde_json::from_value(json!({
            "brokers": "localhost:9092",
            "topic": "events",
        }))
        .unwrap();
        assert_eq!(config.group_id, "streamgate-consumer");
        assert_eq!(config.auto_offset_reset, "latest");
    }

    #[tokio::test]
    async fn read_before_connect_fails() {
        let config: KafkaConsumerConfig = serde_json::from_value(json!({
            "brokers": "localhost:9092",
            "topic": "events",
        }))
        .unwrap();
        let mut connector = KafkaConnector::new(config);
        assert!(matches!(
            connector.read().await,
            Err(ConnectorError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn close_without_connect_is_a_no_op() {
        let config: KafkaConsumerConfig = serde_json::from_value(json!({
            "brokers": "localhost:9092",
            "topic": "events",
        }))
        .unwrap();
        let mut connector = KafkaConnector::new(config);
        connector.close().await.unwrap();
        connector.close().await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Closed);
    }
}
